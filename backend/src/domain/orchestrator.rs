//! Deployment orchestration across sync, store and dispatch.
//!
//! [`DeploymentOrchestrator`] implements the driving port: it resolves
//! fleet entities, runs the hash-gated geozone sync, claims the
//! per-vehicle exclusivity slot through the conditional store write and
//! hands the override submission to the worker. Batch members are
//! isolated; one vehicle failing never aborts the others.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::deployment::{
    Deployment, DeploymentAction, DeploymentStatus, FailureOrigin, NewDeployment,
};
use super::deployment_history::{blocks_itinerary_delete, project, DeploymentHistoryEntry};
use super::external::ExternalGroupId;
use super::fleet::{Itinerary, Vehicle};
use super::geozone_group_sync::{GeozoneGroupSyncService, GroupSyncContext};
use super::ports::{
    DeploymentConfirmation, DeploymentFilter, DeploymentRepository, DeploymentRepositoryError,
    DirectoryError, DisembarkRequest, EmbarkRequest, FleetDirectory, HistoryRequest,
    ItineraryDeployment, OverrideDispatcher, OverrideJob, OverrideSlot, OverrideSubmission,
    QueueDeploymentRequest, QueueOutcome, RequesterContext, VehicleOutcome, VehicleOutcomeStatus,
};
use super::Error;

fn map_deployment_error(error: DeploymentRepositoryError) -> Error {
    match error {
        DeploymentRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("deployment store unavailable: {message}"))
        }
        DeploymentRepositoryError::Query { message } => {
            Error::internal(format!("deployment store error: {message}"))
        }
        DeploymentRepositoryError::NotFound { deployment_id } => {
            Error::not_found(format!("deployment {deployment_id} not found"))
        }
    }
}

fn map_directory_error(error: DirectoryError) -> Error {
    match error {
        DirectoryError::Connection { message } => {
            Error::service_unavailable(format!("fleet directory unavailable: {message}"))
        }
        DirectoryError::Query { message } => {
            Error::internal(format!("fleet directory error: {message}"))
        }
    }
}

/// Shared per-batch inputs resolved before fanning out over vehicles.
struct BatchContext {
    itinerary: Itinerary,
    vehicles_by_id: HashMap<Uuid, Vehicle>,
    config_id: Option<String>,
    external_group_id: Option<ExternalGroupId>,
    requester: RequesterContext,
}

/// Driving-port implementation wiring the pipeline together.
pub struct DeploymentOrchestrator {
    group_sync: Arc<GeozoneGroupSyncService>,
    deployments: Arc<dyn DeploymentRepository>,
    directory: Arc<dyn FleetDirectory>,
    dispatcher: Arc<dyn OverrideDispatcher>,
    /// Slot ids of the device settings that carry the group reference.
    override_slots: Vec<String>,
}

impl DeploymentOrchestrator {
    pub fn new(
        group_sync: Arc<GeozoneGroupSyncService>,
        deployments: Arc<dyn DeploymentRepository>,
        directory: Arc<dyn FleetDirectory>,
        dispatcher: Arc<dyn OverrideDispatcher>,
        override_slots: Vec<String>,
    ) -> Self {
        Self {
            group_sync,
            deployments,
            directory,
            dispatcher,
            override_slots,
        }
    }

    async fn require_itinerary(
        &self,
        client_id: Uuid,
        itinerary_id: Uuid,
    ) -> Result<Itinerary, Error> {
        self.directory
            .find_itinerary(client_id, itinerary_id)
            .await
            .map_err(map_directory_error)?
            .ok_or_else(|| Error::not_found(format!("itinerary {itinerary_id} not found")))
    }

    async fn display_name(&self, client_id: Uuid) -> Result<String, Error> {
        let name = self
            .directory
            .client_display_name(client_id)
            .await
            .map_err(map_directory_error)?;
        Ok(name.unwrap_or_else(|| client_id.to_string()))
    }

    async fn vehicles_by_id(
        &self,
        client_id: Uuid,
        vehicle_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vehicle>, Error> {
        let vehicles = self
            .directory
            .find_vehicles(client_id, vehicle_ids.to_vec())
            .await
            .map_err(map_directory_error)?;
        Ok(vehicles
            .into_iter()
            .map(|vehicle| (vehicle.id, vehicle))
            .collect())
    }

    /// Slot values for one action: embark points every slot at the
    /// group, disembark clears every slot.
    fn slots_for(&self, action: DeploymentAction, group_id: Option<&ExternalGroupId>) -> Vec<OverrideSlot> {
        self.override_slots
            .iter()
            .map(|slot_id| OverrideSlot {
                slot_id: slot_id.clone(),
                value: match action {
                    DeploymentAction::Embark => group_id.map(|id| id.as_str().to_owned()),
                    DeploymentAction::Disembark => None,
                },
            })
            .collect()
    }

    /// Process one vehicle of a batch. Every failure path resolves to a
    /// `Failed` outcome so siblings keep going.
    async fn process_vehicle(
        &self,
        vehicle_id: Uuid,
        action: DeploymentAction,
        dry_run: bool,
        ctx: &BatchContext,
    ) -> VehicleOutcome {
        let Some(vehicle) = ctx.vehicles_by_id.get(&vehicle_id) else {
            return VehicleOutcome {
                vehicle_id,
                status: VehicleOutcomeStatus::Failed,
                deployment_id: None,
                message: Some(format!("vehicle {vehicle_id} is not visible in the client scope")),
            };
        };

        let Some(device_uid) = vehicle.device_uid() else {
            return VehicleOutcome {
                vehicle_id,
                status: VehicleOutcomeStatus::Failed,
                deployment_id: None,
                message: Some(format!(
                    "vehicle {} has no device uid or IMEI and cannot receive overrides",
                    vehicle.label
                )),
            };
        };

        if dry_run {
            return VehicleOutcome {
                vehicle_id,
                status: VehicleOutcomeStatus::Planned,
                deployment_id: None,
                message: None,
            };
        }

        let outcome = self
            .queue_deployment(QueueDeploymentRequest {
                client_id: ctx.itinerary.client_id,
                itinerary_id: ctx.itinerary.id,
                vehicle_id,
                device_uid: device_uid.to_owned(),
                action,
                external_group_id: ctx.external_group_id.clone(),
                itinerary_name: ctx.itinerary.name.clone(),
                vehicle_label: vehicle.label.clone(),
                requester: ctx.requester.clone(),
            })
            .await;
        let deployment = match outcome {
            Ok(QueueOutcome::Active(existing)) => {
                let status = match existing.status {
                    DeploymentStatus::Deployed => VehicleOutcomeStatus::Deployed,
                    DeploymentStatus::Queued => VehicleOutcomeStatus::Queued,
                    _ => VehicleOutcomeStatus::Deploying,
                };
                return VehicleOutcome {
                    vehicle_id,
                    status,
                    deployment_id: Some(existing.id),
                    message: Some(format!(
                        "an earlier {} for this vehicle is still {}",
                        existing.action, existing.status
                    )),
                };
            }
            Ok(QueueOutcome::Queued(deployment)) => deployment,
            Err(error) => {
                return VehicleOutcome {
                    vehicle_id,
                    status: VehicleOutcomeStatus::Failed,
                    deployment_id: None,
                    message: Some(error.message().to_owned()),
                };
            }
        };

        match self.submit_queued(deployment, ctx).await {
            Ok(deployment_id) => VehicleOutcome {
                vehicle_id,
                status: VehicleOutcomeStatus::Queued,
                deployment_id: Some(deployment_id),
                message: None,
            },
            Err((deployment_id, message)) => VehicleOutcome {
                vehicle_id,
                status: VehicleOutcomeStatus::Failed,
                deployment_id,
                message: Some(message),
            },
        }
    }

    /// Advance a freshly queued deployment to SYNCING and hand its
    /// override to the dispatcher.
    async fn submit_queued(
        &self,
        mut deployment: Deployment,
        ctx: &BatchContext,
    ) -> Result<Uuid, (Option<Uuid>, String)> {
        let deployment_id = deployment.id;
        let now = Utc::now();
        if let Err(error) = deployment.transition(DeploymentStatus::Syncing, now) {
            return Err((Some(deployment_id), error.to_string()));
        }
        if let Err(error) = self.deployments.update(deployment.clone()).await {
            return Err((Some(deployment_id), map_deployment_error(error).message().to_owned()));
        }

        let job = OverrideJob {
            deployment_id,
            submission: OverrideSubmission {
                device_uid: deployment.device_uid.clone(),
                config_id: ctx.config_id.clone(),
                slots: self.slots_for(deployment.action, ctx.external_group_id.as_ref()),
            },
        };
        if let Err(dispatch_error) = self.dispatcher.dispatch(job).await {
            let message = format!("override dispatch failed: {dispatch_error}");
            warn!(%deployment_id, error = %dispatch_error, "override dispatch failed");
            if deployment.fail(FailureOrigin::Submission, message.clone(), Utc::now()).is_ok() {
                if let Err(store_error) = self.deployments.update(deployment).await {
                    warn!(%deployment_id, error = %store_error, "failed to persist dispatch failure");
                }
            }
            return Err((Some(deployment_id), message));
        }
        Ok(deployment_id)
    }
}

#[async_trait]
impl ItineraryDeployment for DeploymentOrchestrator {
    async fn queue_deployment(
        &self,
        request: QueueDeploymentRequest,
    ) -> Result<QueueOutcome, Error> {
        let QueueDeploymentRequest {
            client_id,
            itinerary_id,
            vehicle_id,
            device_uid,
            action,
            external_group_id,
            itinerary_name,
            vehicle_label,
            requester,
        } = request;
        let candidate = Deployment::new(
            NewDeployment {
                client_id,
                itinerary_id,
                vehicle_id,
                device_uid,
                action,
                external_group_id,
                itinerary_name,
                vehicle_label,
                requested_by_user_id: requester.user_id,
                requested_by_name: requester.name,
                ip_address: requester.ip_address,
            },
            Utc::now(),
        );
        self.deployments
            .create_if_no_in_flight(candidate)
            .await
            .map_err(map_deployment_error)
    }

    #[instrument(
        skip(self, request),
        fields(
            client_id = %request.client_id,
            itinerary_id = %request.itinerary_id,
            vehicles = request.vehicle_ids.len(),
            dry_run = request.dry_run,
            correlation_id = request.correlation_id.as_deref(),
        )
    )]
    async fn embark_itinerary(
        &self,
        request: EmbarkRequest,
    ) -> Result<Vec<VehicleOutcome>, Error> {
        let itinerary = self
            .require_itinerary(request.client_id, request.itinerary_id)
            .await?;
        let client_display_name = self.display_name(request.client_id).await?;

        let geofences_by_id = match request.geofences_by_id {
            Some(geofences) => geofences,
            None => self
                .directory
                .find_geofences(request.client_id, itinerary.geofence_ids())
                .await
                .map_err(map_directory_error)?
                .into_iter()
                .map(|geofence| (geofence.id, geofence))
                .collect(),
        };

        // One group sync covers the whole batch; a sync failure aborts
        // it before any deployment row exists.
        let group_id = self
            .group_sync
            .ensure_group(
                &itinerary,
                &GroupSyncContext {
                    client_id: request.client_id,
                    client_display_name,
                    geofences_by_id,
                },
            )
            .await?;

        let ctx = BatchContext {
            vehicles_by_id: self
                .vehicles_by_id(request.client_id, &request.vehicle_ids)
                .await?,
            itinerary,
            config_id: request.config_id,
            external_group_id: Some(group_id),
            requester: request.requester,
        };

        let outcomes = join_all(request.vehicle_ids.iter().map(|vehicle_id| {
            self.process_vehicle(*vehicle_id, DeploymentAction::Embark, request.dry_run, &ctx)
        }))
        .await;
        info!(
            queued = outcomes
                .iter()
                .filter(|outcome| outcome.status == VehicleOutcomeStatus::Queued)
                .count(),
            failed = outcomes
                .iter()
                .filter(|outcome| outcome.status == VehicleOutcomeStatus::Failed)
                .count(),
            "embark batch processed"
        );
        Ok(outcomes)
    }

    #[instrument(
        skip(self, request),
        fields(
            client_id = %request.client_id,
            itinerary_id = %request.itinerary_id,
            vehicles = request.vehicle_ids.len(),
        )
    )]
    async fn disembark_itinerary(
        &self,
        request: DisembarkRequest,
    ) -> Result<Vec<VehicleOutcome>, Error> {
        let itinerary = self
            .require_itinerary(request.client_id, request.itinerary_id)
            .await?;

        // Disembark never touches geozones or groups; the mapping rows
        // stay for the next embark.
        let ctx = BatchContext {
            vehicles_by_id: self
                .vehicles_by_id(request.client_id, &request.vehicle_ids)
                .await?,
            itinerary,
            config_id: request.config_id,
            external_group_id: None,
            requester: request.requester,
        };

        let outcomes = join_all(request.vehicle_ids.iter().map(|vehicle_id| {
            self.process_vehicle(*vehicle_id, DeploymentAction::Disembark, false, &ctx)
        }))
        .await;
        Ok(outcomes)
    }

    async fn update_deployment(
        &self,
        deployment_id: Uuid,
        confirmation: DeploymentConfirmation,
    ) -> Result<Deployment, Error> {
        let mut deployment = self
            .deployments
            .find_by_id(deployment_id)
            .await
            .map_err(map_deployment_error)?
            .ok_or_else(|| Error::not_found(format!("deployment {deployment_id} not found")))?;

        let now = Utc::now();
        let transition = match confirmation {
            DeploymentConfirmation::Confirmed => {
                if deployment.action != DeploymentAction::Embark {
                    return Err(Error::conflict(format!(
                        "deployment {deployment_id} is a {} and cannot be confirmed as deployed",
                        deployment.action
                    )));
                }
                deployment.confirmed_at = Some(now);
                deployment.device_confirmed_at = Some(now);
                deployment.transition(DeploymentStatus::Deployed, now)
            }
            DeploymentConfirmation::Cleared => {
                if deployment.action != DeploymentAction::Disembark {
                    return Err(Error::conflict(format!(
                        "deployment {deployment_id} is an {} and cannot be confirmed as cleared",
                        deployment.action
                    )));
                }
                deployment.confirmed_at = Some(now);
                deployment.device_confirmed_at = Some(now);
                deployment.transition(DeploymentStatus::Cleared, now)
            }
            DeploymentConfirmation::Failed { message, origin } => {
                deployment.fail(origin, message, now)
            }
            DeploymentConfirmation::TimedOut => {
                deployment.transition(DeploymentStatus::Timeout, now)
            }
        };
        transition.map_err(|error| Error::conflict(error.to_string()))?;

        self.deployments
            .update(deployment.clone())
            .await
            .map_err(map_deployment_error)?;
        info!(%deployment_id, status = %deployment.status, "deployment confirmation applied");
        Ok(deployment)
    }

    async fn get_deployment(
        &self,
        client_id: Uuid,
        deployment_id: Uuid,
    ) -> Result<Deployment, Error> {
        let deployment = self
            .deployments
            .find_by_id(deployment_id)
            .await
            .map_err(map_deployment_error)?;
        // A deployment outside the client scope reads as absent.
        deployment
            .filter(|found| found.client_id == client_id)
            .ok_or_else(|| Error::not_found(format!("deployment {deployment_id} not found")))
    }

    async fn deployment_history(
        &self,
        client_id: Uuid,
        request: HistoryRequest,
    ) -> Result<Vec<DeploymentHistoryEntry>, Error> {
        let deployments = self
            .deployments
            .list(
                client_id,
                DeploymentFilter {
                    itinerary_id: request.itinerary_id,
                    vehicle_id: request.vehicle_id,
                    status: None,
                },
            )
            .await
            .map_err(map_deployment_error)?;
        Ok(deployments.iter().map(project).collect())
    }

    async fn itinerary_blockers(
        &self,
        client_id: Uuid,
        itinerary_id: Uuid,
    ) -> Result<Vec<Uuid>, Error> {
        let latest = self
            .deployments
            .latest_per_vehicle(client_id, itinerary_id)
            .await
            .map_err(map_deployment_error)?;
        Ok(latest
            .iter()
            .filter(|deployment| blocks_itinerary_delete(deployment))
            .map(|deployment| deployment.vehicle_id)
            .collect())
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
