//! Deployment history projection for audit display.
//!
//! Pure functions from a [`Deployment`] record to the operator-facing
//! vocabulary. Raw internal statuses fold into a small set of labels,
//! keeping "we never heard back" distinguishable from "the submission
//! was rejected".

use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use super::deployment::{Deployment, DeploymentAction, DeploymentStatus, FailureOrigin};

/// Operator-facing projection of one deployment record.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentHistoryEntry {
    pub deployment_id: Uuid,
    pub itinerary_id: Uuid,
    pub itinerary_name: String,
    pub vehicle_id: Uuid,
    pub vehicle_label: String,
    pub status_label: String,
    pub action_label: String,
    pub message: String,
    pub details: serde_json::Value,
}

/// Fold a raw status into the operator vocabulary.
pub fn status_label(status: DeploymentStatus, failure_origin: Option<FailureOrigin>) -> &'static str {
    match status {
        DeploymentStatus::Cleared => "CONCLUÍDO",
        DeploymentStatus::Deployed => "EMBARCADO",
        DeploymentStatus::Deploying => "ENVIADO",
        DeploymentStatus::Queued | DeploymentStatus::Syncing => "PENDENTE",
        DeploymentStatus::Failed => match failure_origin {
            Some(FailureOrigin::Device) => "FALHOU (EQUIPAMENTO)",
            _ => "FALHOU (ENVIO)",
        },
        DeploymentStatus::Timeout => "FALHOU (EQUIPAMENTO)",
    }
}

fn action_label(action: DeploymentAction) -> &'static str {
    match action {
        DeploymentAction::Embark => "EMBARQUE",
        DeploymentAction::Disembark => "DESEMBARQUE",
    }
}

fn message(deployment: &Deployment) -> String {
    let itinerary = deployment.itinerary_name.as_str();
    let vehicle = deployment.vehicle_label.as_str();
    match deployment.status {
        DeploymentStatus::Deployed => {
            format!("Itinerário {itinerary} embarcado no veículo {vehicle}")
        }
        DeploymentStatus::Cleared => {
            format!("Itinerário {itinerary} desembarcado do veículo {vehicle}")
        }
        DeploymentStatus::Deploying => {
            format!("Enviado ao veículo {vehicle}, aguardando confirmação do equipamento")
        }
        DeploymentStatus::Queued | DeploymentStatus::Syncing => {
            format!("Aguardando envio ao veículo {vehicle}")
        }
        DeploymentStatus::Failed => deployment
            .error_message
            .clone()
            .unwrap_or_else(|| format!("Falha no envio ao veículo {vehicle}")),
        DeploymentStatus::Timeout => {
            format!("Sem confirmação do equipamento do veículo {vehicle} dentro do prazo")
        }
    }
}

/// Project a deployment record into its audit-display entry.
pub fn project(deployment: &Deployment) -> DeploymentHistoryEntry {
    DeploymentHistoryEntry {
        deployment_id: deployment.id,
        itinerary_id: deployment.itinerary_id,
        itinerary_name: deployment.itinerary_name.clone(),
        vehicle_id: deployment.vehicle_id,
        vehicle_label: deployment.vehicle_label.clone(),
        status_label: status_label(deployment.status, deployment.failure_origin).to_owned(),
        action_label: action_label(deployment.action).to_owned(),
        message: message(deployment),
        details: json!({
            "status": deployment.status,
            "action": deployment.action,
            "deviceUid": deployment.device_uid,
            "startedAt": deployment.started_at,
            "finishedAt": deployment.finished_at,
            "confirmedAt": deployment.confirmed_at,
            "deviceConfirmedAt": deployment.device_confirmed_at,
            "failureOrigin": deployment.failure_origin,
            "errorDetails": deployment.error_details,
            "requestedByName": deployment.requested_by_name,
        }),
    }
}

/// Whether a vehicle's *latest* deployment blocks itinerary deletion.
///
/// A latest successful disembark means nothing remains on the device,
/// so older embark records for the same pair never count.
pub fn blocks_itinerary_delete(latest: &Deployment) -> bool {
    match latest.action {
        DeploymentAction::Embark => {
            latest.status.is_in_flight() || latest.status == DeploymentStatus::Deployed
        }
        DeploymentAction::Disembark => latest.status.is_in_flight(),
    }
}
