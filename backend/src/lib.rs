//! Fleet-tracking backend: itinerary deployment pipeline.
//!
//! The crate keeps an external device-configuration service ("XDM") in
//! step with the platform's internal itineraries and geofences. The
//! domain layer owns the sync and deployment semantics; inbound and
//! outbound adapters stay thin.

pub mod domain;
pub mod inbound;
pub mod outbound;
