//! External identity space and persisted sync state.
//!
//! The device-configuration service ("XDM") assigns its own geozone and
//! geozone-group identifiers. Mapping rows remember which external id a
//! piece of internal state was synced to, together with the content
//! hash that was current at sync time, so unchanged state never causes
//! a second external write.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::GeometryHash;

/// Identifier assigned by the external service to one geozone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalGeozoneId(String);

impl ExternalGeozoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ExternalGeozoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier assigned by the external service to one geozone group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
#[schema(value_type = String)]
pub struct ExternalGroupId(String);

impl ExternalGroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ExternalGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per geofence per client scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceMapping {
    pub geofence_id: Uuid,
    pub client_id: Uuid,
    pub external_geozone_id: ExternalGeozoneId,
    pub geometry_hash: GeometryHash,
    pub external_name: String,
}

/// Scope a geozone group is keyed by: an itinerary or an ad-hoc set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupScope {
    Itinerary(Uuid),
    AdHoc(String),
}

impl fmt::Display for GroupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Itinerary(id) => write!(f, "itinerary:{id}"),
            Self::AdHoc(key) => write!(f, "adhoc:{key}"),
        }
    }
}

/// One row per group scope per client scope.
///
/// The member-set hash is computed over the sorted *external* geozone
/// ids, so it changes when itinerary membership changes or when any
/// member's geometry is re-synced under a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeozoneGroupMapping {
    pub scope: GroupScope,
    pub client_id: Uuid,
    pub external_group_id: ExternalGroupId,
    pub member_set_hash: String,
}
