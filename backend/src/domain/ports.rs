//! Domain ports defining the edges of the hexagon.
//!
//! Driven ports describe how the pipeline expects to reach its
//! collaborators (mapping stores, the deployment store, the fleet
//! read side and the external device-configuration service). Each
//! trait exposes strongly typed errors so adapters map their failures
//! into predictable variants instead of returning `anyhow::Result`.
//! The driving port [`ItineraryDeployment`] is what inbound adapters
//! call.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::deployment::{Deployment, DeploymentAction, DeploymentStatus, FailureOrigin};
use super::deployment_history::DeploymentHistoryEntry;
use super::external::{
    ExternalGeozoneId, ExternalGroupId, GeofenceMapping, GeozoneGroupMapping, GroupScope,
};
use super::fleet::{Geofence, Itinerary, Vehicle};
use super::geometry::GeoPoint;
use super::Error;

/// Errors surfaced by mapping-table adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingRepositoryError {
    /// Store connectivity failures.
    #[error("mapping store connection failed: {message}")]
    Connection { message: String },
    /// Query or write failures bubbling up from the adapter.
    #[error("mapping store query failed: {message}")]
    Query { message: String },
}

impl MappingRepositoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the deployment store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeploymentRepositoryError {
    /// Store connectivity failures.
    #[error("deployment store connection failed: {message}")]
    Connection { message: String },
    /// Query or write failures bubbling up from the adapter.
    #[error("deployment store query failed: {message}")]
    Query { message: String },
    /// The referenced deployment row does not exist.
    #[error("deployment {deployment_id} not found")]
    NotFound { deployment_id: Uuid },
}

impl DeploymentRepositoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn not_found(deployment_id: Uuid) -> Self {
        Self::NotFound { deployment_id }
    }
}

/// Errors surfaced by the fleet read-side adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Read side unavailable.
    #[error("fleet directory unavailable: {message}")]
    Connection { message: String },
    /// Lookup failed during execution.
    #[error("fleet directory lookup failed: {message}")]
    Query { message: String },
}

impl DirectoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the device-configuration gateway adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Bearer token could not be obtained or was rejected.
    #[error("device-configuration auth failed: {message}")]
    Auth { message: String },
    /// Network-level failure reaching the external service.
    #[error("device-configuration transport failed: {message}")]
    Transport { message: String },
    /// The external service did not answer in time.
    #[error("device-configuration request timed out: {message}")]
    Timeout { message: String },
    /// The external service rejected the request as malformed.
    #[error("device-configuration rejected request: {message}")]
    InvalidRequest { message: String },
    /// The external service rejected a geometry payload for size.
    #[error("device-configuration rejected payload for size: {message}")]
    PayloadTooLarge { message: String },
    /// The external response could not be decoded.
    #[error("device-configuration response could not be decoded: {message}")]
    Decode { message: String },
}

impl GatewayError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::PayloadTooLarge {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the override dispatcher adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The worker channel or queue is gone.
    #[error("override dispatcher unavailable: {message}")]
    Unavailable { message: String },
}

impl DispatchError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Persistence port for geofence-to-geozone mapping rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeofenceMappingRepository: Send + Sync {
    /// Fetch the mapping for one geofence within one client scope.
    async fn find(
        &self,
        geofence_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<GeofenceMapping>, MappingRepositoryError>;

    /// Insert or replace the mapping row for its (geofence, client) key.
    async fn upsert(&self, mapping: GeofenceMapping) -> Result<(), MappingRepositoryError>;
}

/// Persistence port for group-scope mapping rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeozoneGroupMappingRepository: Send + Sync {
    /// Fetch the mapping for one scope within one client scope.
    async fn find(
        &self,
        scope: GroupScope,
        client_id: Uuid,
    ) -> Result<Option<GeozoneGroupMapping>, MappingRepositoryError>;

    /// Insert or replace the mapping row for its (scope, client) key.
    async fn upsert(&self, mapping: GeozoneGroupMapping) -> Result<(), MappingRepositoryError>;
}

/// Outcome of the conditional deployment write.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    /// The candidate row was stored; the tuple had no in-flight row.
    Queued(Deployment),
    /// An in-flight row already holds the tuple; it is returned instead
    /// and the candidate is discarded.
    Active(Deployment),
}

impl QueueOutcome {
    /// The deployment now holding the tuple, whichever way it got there.
    pub fn deployment(&self) -> &Deployment {
        match self {
            Self::Queued(deployment) | Self::Active(deployment) => deployment,
        }
    }
}

/// Listing filter for deployment history queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentFilter {
    pub itinerary_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub status: Option<DeploymentStatus>,
}

/// Persistence port for deployment rows and their audit log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    /// Store `candidate` unless the (client, itinerary, vehicle) tuple
    /// already holds an in-flight row.
    ///
    /// This is the dedup primitive: lookup and insert must be one
    /// atomic store operation so concurrent callers cannot both create
    /// a row for the same tuple.
    async fn create_if_no_in_flight(
        &self,
        candidate: Deployment,
    ) -> Result<QueueOutcome, DeploymentRepositoryError>;

    /// Fetch one deployment by id.
    async fn find_by_id(&self, id: Uuid)
        -> Result<Option<Deployment>, DeploymentRepositoryError>;

    /// Replace the stored row with `deployment`; the embedded audit log
    /// travels with it.
    async fn update(&self, deployment: Deployment) -> Result<(), DeploymentRepositoryError>;

    /// List deployments for a client, newest first.
    async fn list(
        &self,
        client_id: Uuid,
        filter: DeploymentFilter,
    ) -> Result<Vec<Deployment>, DeploymentRepositoryError>;

    /// Latest deployment per vehicle for one itinerary (derived view).
    async fn latest_per_vehicle(
        &self,
        client_id: Uuid,
        itinerary_id: Uuid,
    ) -> Result<Vec<Deployment>, DeploymentRepositoryError>;
}

/// Narrow read-only port onto the wider platform's CRUD side.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FleetDirectory: Send + Sync {
    /// Fetch an itinerary visible to the client scope.
    async fn find_itinerary(
        &self,
        client_id: Uuid,
        itinerary_id: Uuid,
    ) -> Result<Option<Itinerary>, DirectoryError>;

    /// Fetch geofences by id within the client scope.
    async fn find_geofences(
        &self,
        client_id: Uuid,
        geofence_ids: Vec<Uuid>,
    ) -> Result<Vec<Geofence>, DirectoryError>;

    /// Fetch vehicles by id within the client scope.
    async fn find_vehicles(
        &self,
        client_id: Uuid,
        vehicle_ids: Vec<Uuid>,
    ) -> Result<Vec<Vehicle>, DirectoryError>;

    /// Display name used to prefix external geozone/group names.
    async fn client_display_name(&self, client_id: Uuid) -> Result<Option<String>, DirectoryError>;
}

/// Geometry payload submitted to the external import endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GeozoneImport {
    pub name: String,
    pub ring: Vec<GeoPoint>,
}

/// One `{slotId, value}` pair of a per-device settings override.
///
/// A `None` value clears the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideSlot {
    pub slot_id: String,
    pub value: Option<String>,
}

/// Per-device settings override submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideSubmission {
    pub device_uid: String,
    pub config_id: Option<String>,
    pub slots: Vec<OverrideSlot>,
}

/// Outbound port onto the external device-configuration service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceConfigGateway: Send + Sync {
    /// Import one geozone, returning the id the service assigned.
    async fn import_geozone(
        &self,
        request: GeozoneImport,
    ) -> Result<ExternalGeozoneId, GatewayError>;

    /// Delete one geozone, used after a replacement import succeeded.
    async fn delete_geozone(&self, id: ExternalGeozoneId) -> Result<(), GatewayError>;

    /// Create or update a geozone group from its member geozone ids.
    ///
    /// `existing` selects update-in-place when the scope was synced
    /// before.
    async fn upsert_geozone_group(
        &self,
        existing: Option<ExternalGroupId>,
        name: String,
        member_ids: Vec<ExternalGeozoneId>,
    ) -> Result<ExternalGroupId, GatewayError>;

    /// Submit a per-device settings override.
    async fn submit_override(&self, submission: OverrideSubmission) -> Result<(), GatewayError>;
}

/// Unit of fire-and-forget work handed to the override worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideJob {
    pub deployment_id: Uuid,
    pub submission: OverrideSubmission,
}

/// Port for dispatching override submissions off the request path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OverrideDispatcher: Send + Sync {
    /// Hand a job to the worker; returns once the job is accepted, not
    /// once the device confirms.
    async fn dispatch(&self, job: OverrideJob) -> Result<(), DispatchError>;
}

/// Requester identity captured on every deployment for audit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequesterContext {
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub ip_address: Option<String>,
}

/// Parameters for the dedup primitive.
#[derive(Debug, Clone)]
pub struct QueueDeploymentRequest {
    pub client_id: Uuid,
    pub itinerary_id: Uuid,
    pub vehicle_id: Uuid,
    pub device_uid: String,
    pub action: DeploymentAction,
    pub external_group_id: Option<ExternalGroupId>,
    pub itinerary_name: String,
    pub vehicle_label: String,
    pub requester: RequesterContext,
}

/// Parameters for one embark batch.
#[derive(Debug, Clone)]
pub struct EmbarkRequest {
    pub client_id: Uuid,
    pub itinerary_id: Uuid,
    pub vehicle_ids: Vec<Uuid>,
    pub config_id: Option<String>,
    pub dry_run: bool,
    /// Pre-resolved geofences; looked up from the directory when absent.
    pub geofences_by_id: Option<HashMap<Uuid, Geofence>>,
    pub correlation_id: Option<String>,
    pub requester: RequesterContext,
}

/// Parameters for one disembark batch.
#[derive(Debug, Clone)]
pub struct DisembarkRequest {
    pub client_id: Uuid,
    pub itinerary_id: Uuid,
    pub vehicle_ids: Vec<Uuid>,
    pub config_id: Option<String>,
    pub requester: RequesterContext,
}

/// Per-vehicle result category of a batch request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum VehicleOutcomeStatus {
    /// A new deployment was queued and its override dispatched.
    Queued,
    /// An in-flight deployment already covers this vehicle.
    Deploying,
    /// A deployed record already covers this vehicle.
    Deployed,
    /// Dry run: sync and resolution succeeded, nothing was submitted.
    Planned,
    /// Validation or submission failed for this vehicle only.
    Failed,
}

/// Per-vehicle result of a batch request.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleOutcome {
    pub vehicle_id: Uuid,
    pub status: VehicleOutcomeStatus,
    pub deployment_id: Option<Uuid>,
    pub message: Option<String>,
}

/// Out-of-band confirmation applied to a deployment.
#[derive(Debug, Clone, PartialEq)]
pub enum DeploymentConfirmation {
    /// The device applied the override (embark success).
    Confirmed,
    /// The device cleared the override (disembark success).
    Cleared,
    /// A collaborator reported a failure.
    Failed {
        message: String,
        origin: FailureOrigin,
    },
    /// The reaper gave up waiting for confirmation.
    TimedOut,
}

/// History listing parameters.
#[derive(Debug, Clone, Default)]
pub struct HistoryRequest {
    pub itinerary_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
}

/// Driving port exposing the deployment pipeline to inbound adapters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItineraryDeployment: Send + Sync {
    /// Dedup primitive; callers never create deployment rows directly.
    async fn queue_deployment(
        &self,
        request: QueueDeploymentRequest,
    ) -> Result<QueueOutcome, Error>;

    /// Apply an itinerary to a batch of vehicles.
    async fn embark_itinerary(&self, request: EmbarkRequest)
        -> Result<Vec<VehicleOutcome>, Error>;

    /// Remove an itinerary from a batch of vehicles.
    async fn disembark_itinerary(
        &self,
        request: DisembarkRequest,
    ) -> Result<Vec<VehicleOutcome>, Error>;

    /// Apply an out-of-band confirmation (webhook, poll, reaper).
    async fn update_deployment(
        &self,
        deployment_id: Uuid,
        confirmation: DeploymentConfirmation,
    ) -> Result<Deployment, Error>;

    /// Fetch one deployment within the client scope.
    async fn get_deployment(&self, client_id: Uuid, deployment_id: Uuid)
        -> Result<Deployment, Error>;

    /// Project deployment history for audit display.
    async fn deployment_history(
        &self,
        client_id: Uuid,
        request: HistoryRequest,
    ) -> Result<Vec<DeploymentHistoryEntry>, Error>;

    /// Vehicles whose latest deployment still blocks itinerary deletion.
    async fn itinerary_blockers(
        &self,
        client_id: Uuid,
        itinerary_id: Uuid,
    ) -> Result<Vec<Uuid>, Error>;
}
