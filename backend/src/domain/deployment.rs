//! Deployment records and their status state machine.
//!
//! One [`Deployment`] row is created per attempt to apply or remove an
//! itinerary on one vehicle. Rows are append-only history; the tuple
//! (client, itinerary, vehicle) may hold at most one in-flight row at a
//! time, which the repository's conditional write enforces.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::external::ExternalGroupId;

/// Whether the deployment applies or removes an itinerary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentAction {
    Embark,
    Disembark,
}

impl fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embark => f.write_str("EMBARK"),
            Self::Disembark => f.write_str("DISEMBARK"),
        }
    }
}

/// Pipeline position of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Queued,
    Syncing,
    Deploying,
    Deployed,
    Cleared,
    Failed,
    Timeout,
}

impl DeploymentStatus {
    /// In-flight statuses hold the per-tuple exclusivity slot.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Queued | Self::Syncing | Self::Deploying)
    }

    /// Terminal statuses free the tuple for a new deployment.
    pub fn is_terminal(self) -> bool {
        !self.is_in_flight()
    }

    /// Whether the state machine permits moving to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Queued => matches!(next, Self::Syncing | Self::Failed),
            Self::Syncing => matches!(next, Self::Deploying | Self::Failed | Self::Timeout),
            Self::Deploying => matches!(
                next,
                Self::Deployed | Self::Cleared | Self::Failed | Self::Timeout
            ),
            Self::Deployed | Self::Cleared | Self::Failed | Self::Timeout => false,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "QUEUED",
            Self::Syncing => "SYNCING",
            Self::Deploying => "DEPLOYING",
            Self::Deployed => "DEPLOYED",
            Self::Cleared => "CLEARED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        };
        f.write_str(label)
    }
}

/// Which side produced a failure: our submission path or the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    Submission,
    Device,
}

/// Append-only audit log entry on a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeploymentLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Rejected status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deployment cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: DeploymentStatus,
    pub to: DeploymentStatus,
}

/// Request-time fields for a new deployment record.
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub client_id: Uuid,
    pub itinerary_id: Uuid,
    pub vehicle_id: Uuid,
    pub device_uid: String,
    pub action: DeploymentAction,
    pub external_group_id: Option<ExternalGroupId>,
    /// Snapshot of the itinerary name for historical display.
    pub itinerary_name: String,
    /// Snapshot of the vehicle label for historical display.
    pub vehicle_label: String,
    pub requested_by_user_id: Option<Uuid>,
    pub requested_by_name: Option<String>,
    pub ip_address: Option<String>,
}

/// One attempt to apply or remove an itinerary on one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub itinerary_id: Uuid,
    pub vehicle_id: Uuid,
    pub device_uid: String,
    pub action: DeploymentAction,
    pub status: DeploymentStatus,
    pub external_group_id: Option<ExternalGroupId>,
    pub itinerary_name: String,
    pub vehicle_label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub device_confirmed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub failure_origin: Option<FailureOrigin>,
    pub log: Vec<DeploymentLogEntry>,
    pub requested_by_user_id: Option<Uuid>,
    pub requested_by_name: Option<String>,
    pub ip_address: Option<String>,
}

impl Deployment {
    /// Create a queued deployment from request-time fields.
    pub fn new(draft: NewDeployment, now: DateTime<Utc>) -> Self {
        let NewDeployment {
            client_id,
            itinerary_id,
            vehicle_id,
            device_uid,
            action,
            external_group_id,
            itinerary_name,
            vehicle_label,
            requested_by_user_id,
            requested_by_name,
            ip_address,
        } = draft;
        Self {
            id: Uuid::new_v4(),
            client_id,
            itinerary_id,
            vehicle_id,
            device_uid,
            action,
            status: DeploymentStatus::Queued,
            external_group_id,
            itinerary_name,
            vehicle_label,
            started_at: now,
            finished_at: None,
            confirmed_at: None,
            device_confirmed_at: None,
            error_message: None,
            error_details: None,
            failure_origin: None,
            log: vec![DeploymentLogEntry {
                at: now,
                message: format!("{action} queued"),
            }],
            requested_by_user_id,
            requested_by_name,
            ip_address,
        }
    }

    /// Move to `next`, stamping `finished_at` on terminal statuses.
    pub fn transition(
        &mut self,
        next: DeploymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.push_log(now, format!("status moved to {next}"));
        Ok(())
    }

    /// Record a failure with its origin and message.
    pub fn fail(
        &mut self,
        origin: FailureOrigin,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let message = message.into();
        self.transition(DeploymentStatus::Failed, now)?;
        self.error_message = Some(message.clone());
        self.failure_origin = Some(origin);
        self.push_log(now, message);
        Ok(())
    }

    /// Append an audit log entry.
    pub fn push_log(&mut self, now: DateTime<Utc>, message: impl Into<String>) {
        self.log.push(DeploymentLogEntry {
            at: now,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample(action: DeploymentAction) -> Deployment {
        Deployment::new(
            NewDeployment {
                client_id: Uuid::new_v4(),
                itinerary_id: Uuid::new_v4(),
                vehicle_id: Uuid::new_v4(),
                device_uid: "uid-1".to_owned(),
                action,
                external_group_id: None,
                itinerary_name: "Rota Centro".to_owned(),
                vehicle_label: "ABC-1234".to_owned(),
                requested_by_user_id: None,
                requested_by_name: None,
                ip_address: None,
            },
            Utc::now(),
        )
    }

    #[rstest]
    #[case(DeploymentStatus::Queued, DeploymentStatus::Syncing, true)]
    #[case(DeploymentStatus::Queued, DeploymentStatus::Deploying, false)]
    #[case(DeploymentStatus::Syncing, DeploymentStatus::Deploying, true)]
    #[case(DeploymentStatus::Syncing, DeploymentStatus::Timeout, true)]
    #[case(DeploymentStatus::Deploying, DeploymentStatus::Deployed, true)]
    #[case(DeploymentStatus::Deploying, DeploymentStatus::Cleared, true)]
    #[case(DeploymentStatus::Deployed, DeploymentStatus::Failed, false)]
    #[case(DeploymentStatus::Cleared, DeploymentStatus::Syncing, false)]
    #[case(DeploymentStatus::Queued, DeploymentStatus::Timeout, false)]
    fn transition_table(
        #[case] from: DeploymentStatus,
        #[case] to: DeploymentStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn new_deployment_starts_queued_with_log() {
        let deployment = sample(DeploymentAction::Embark);
        assert_eq!(deployment.status, DeploymentStatus::Queued);
        assert!(deployment.status.is_in_flight());
        assert_eq!(deployment.log.len(), 1);
        assert!(deployment.log[0].message.contains("EMBARK"));
    }

    #[test]
    fn terminal_transition_stamps_finished_at() {
        let mut deployment = sample(DeploymentAction::Embark);
        let now = Utc::now();
        deployment
            .transition(DeploymentStatus::Syncing, now)
            .expect("queued to syncing");
        deployment
            .fail(FailureOrigin::Submission, "token fetch failed", now)
            .expect("syncing to failed");
        assert_eq!(deployment.finished_at, Some(now));
        assert_eq!(deployment.failure_origin, Some(FailureOrigin::Submission));
        assert_eq!(deployment.error_message.as_deref(), Some("token fetch failed"));
    }

    #[test]
    fn rejected_transition_reports_both_states() {
        let mut deployment = sample(DeploymentAction::Disembark);
        let error = deployment
            .transition(DeploymentStatus::Deployed, Utc::now())
            .expect_err("queued cannot deploy directly");
        assert_eq!(error.from, DeploymentStatus::Queued);
        assert_eq!(error.to, DeploymentStatus::Deployed);
    }

    #[test]
    fn status_serialises_as_screaming_snake() {
        let value = serde_json::to_value(DeploymentStatus::Timeout).expect("serialises");
        assert_eq!(value, "TIMEOUT");
    }
}
