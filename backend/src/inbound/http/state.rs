//! Shared HTTP adapter state.
//!
//! Handlers accept this state via `actix_web::web::Data` so they only
//! depend on the driving port and remain testable without I/O.

use std::sync::Arc;

use crate::domain::ports::ItineraryDeployment;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub deployment: Arc<dyn ItineraryDeployment>,
}

impl HttpState {
    pub fn new(deployment: Arc<dyn ItineraryDeployment>) -> Self {
        Self { deployment }
    }
}
