//! Domain layer of the itinerary deployment pipeline.
//!
//! Pure types and services live here behind the ports in [`ports`];
//! adapters under `inbound` and `outbound` only ever touch this layer
//! through those traits. Geometry normalisation and the hash gates are
//! plain functions so the sync services stay deterministic and easy to
//! test.

pub mod deployment;
pub mod deployment_history;
pub mod error;
pub mod external;
pub mod fleet;
pub mod geofence_sync;
pub mod geometry;
pub mod geozone_group_sync;
pub mod orchestrator;
pub mod override_worker;
pub mod ports;

pub use error::{Error, ErrorCode};
pub use external::{
    ExternalGeozoneId, ExternalGroupId, GeofenceMapping, GeozoneGroupMapping, GroupScope,
};
pub use orchestrator::DeploymentOrchestrator;
pub use override_worker::{ChannelOverrideDispatcher, OverrideWorker};
