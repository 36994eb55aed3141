//! HTTP inbound adapter.
//!
//! Thin actix-web handlers over the driving port plus the domain error
//! mapping. No business rules live here.

pub mod deployments;
pub mod error;
pub mod state;

pub use error::ApiResult;

use actix_web::web;

/// Register every route under `/api/v1`.
pub fn configure(config: &mut web::ServiceConfig) {
    config.service(
        web::scope("/api/v1")
            .service(deployments::embark_itinerary_batch)
            .service(deployments::deployment_history)
            .service(deployments::embark_itinerary)
            .service(deployments::disembark_itinerary)
            .service(deployments::get_deployment),
    );
}
