//! Persistence outbound adapters.
//!
//! The pipeline's stores are process-local maps behind the repository
//! ports; swapping in a database later only means writing new adapters
//! against the same traits.

mod memory;

pub use memory::{
    InMemoryDeploymentRepository, InMemoryFleetDirectory, InMemoryGeofenceMappingRepository,
    InMemoryGeozoneGroupMappingRepository,
};
