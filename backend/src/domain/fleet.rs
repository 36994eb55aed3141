//! Fleet aggregates: geofences, itineraries, vehicles.
//!
//! These are read models of state owned by the wider platform; the
//! pipeline consumes them through the [`FleetDirectory`] port and never
//! mutates them.
//!
//! [`FleetDirectory`]: super::ports::FleetDirectory

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::GeofenceShape;

/// A named geofence owned by one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub shape: GeofenceShape,
}

/// One entry of an itinerary's ordered item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ItineraryItem {
    Geofence(Uuid),
    Route(Uuid),
}

/// A named set of geofences/routes applied to tracking devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub items: Vec<ItineraryItem>,
}

impl Itinerary {
    /// Geofence ids referenced by this itinerary, in item order.
    pub fn geofence_ids(&self) -> Vec<Uuid> {
        self.items
            .iter()
            .filter_map(|item| match item {
                ItineraryItem::Geofence(id) => Some(*id),
                ItineraryItem::Route(_) => None,
            })
            .collect()
    }
}

/// Tracking device linked to a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingDevice {
    pub uid: String,
}

/// A vehicle and its device linkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub client_id: Uuid,
    pub label: String,
    pub device: Option<TrackingDevice>,
    /// Legacy IMEI field kept for fleets migrated before device records
    /// carried a uid.
    pub legacy_imei: Option<String>,
}

impl Vehicle {
    /// Resolve the identifier used to address this vehicle's device.
    ///
    /// Prefers the linked device's uid and falls back to the legacy
    /// IMEI. `None` means the vehicle cannot receive overrides.
    pub fn device_uid(&self) -> Option<&str> {
        if let Some(device) = &self.device {
            if !device.uid.trim().is_empty() {
                return Some(device.uid.as_str());
            }
        }
        self.legacy_imei
            .as_deref()
            .filter(|imei| !imei.trim().is_empty())
    }
}
