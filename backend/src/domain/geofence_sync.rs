//! Idempotent sync of one geofence to one external geozone.
//!
//! The persisted mapping row carries the geometry hash current at the
//! last successful sync; an unchanged hash short-circuits the call
//! with zero external writes.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::external::{ExternalGeozoneId, GeofenceMapping};
use super::fleet::Geofence;
use super::geometry::{geometry_hash, normalize_polygon};
use super::ports::{
    DeviceConfigGateway, GatewayError, GeofenceMappingRepository, GeozoneImport,
    MappingRepositoryError,
};
use super::Error;

/// Parameters for one geofence sync.
#[derive(Debug, Clone)]
pub struct SyncGeofenceRequest {
    pub client_id: Uuid,
    /// Display name used to prefix the external geozone name.
    pub client_display_name: String,
    pub geofence: Geofence,
    /// Itinerary driving the sync, when there is one; logged only.
    pub itinerary_id: Option<Uuid>,
}

pub(crate) fn map_mapping_error(error: MappingRepositoryError) -> Error {
    match error {
        MappingRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("mapping store unavailable: {message}"))
        }
        MappingRepositoryError::Query { message } => {
            Error::internal(format!("mapping store error: {message}"))
        }
    }
}

pub(crate) fn map_gateway_error(error: GatewayError, subject: &str) -> Error {
    match error {
        GatewayError::PayloadTooLarge { message } => Error::payload_too_large(format!(
            "{subject} was rejected by the device-configuration service for size: {message}"
        )),
        GatewayError::Auth { message }
        | GatewayError::Transport { message }
        | GatewayError::Timeout { message } => Error::service_unavailable(format!(
            "device-configuration service unreachable for {subject}: {message}"
        )),
        GatewayError::InvalidRequest { message } => Error::invalid_request(format!(
            "device-configuration service rejected {subject}: {message}"
        )),
        GatewayError::Decode { message } => Error::internal(format!(
            "device-configuration response for {subject} could not be decoded: {message}"
        )),
    }
}

/// Hash-gated sync of single geofences.
pub struct GeofenceSyncService {
    mappings: Arc<dyn GeofenceMappingRepository>,
    gateway: Arc<dyn DeviceConfigGateway>,
    /// Maximum points per geofence; `None` means unlimited.
    max_points: Option<usize>,
}

impl GeofenceSyncService {
    pub fn new(
        mappings: Arc<dyn GeofenceMappingRepository>,
        gateway: Arc<dyn DeviceConfigGateway>,
        max_points: Option<usize>,
    ) -> Self {
        Self {
            mappings,
            gateway,
            max_points,
        }
    }

    /// Ensure one geofence exists externally, returning its geozone id.
    ///
    /// Performs zero or one external write: none when the persisted
    /// hash matches the current geometry, one import otherwise. When a
    /// replacement import succeeds under a new id, the superseded
    /// geozone is deleted best-effort after the mapping is updated.
    pub async fn sync_geofence(
        &self,
        request: SyncGeofenceRequest,
    ) -> Result<ExternalGeozoneId, Error> {
        let geofence = &request.geofence;
        let ring = normalize_polygon(&geofence.shape, self.max_points).map_err(|error| {
            Error::invalid_request(format!("geofence {}: {error}", geofence.name))
        })?;
        let hash = geometry_hash(&ring);

        let existing = self
            .mappings
            .find(geofence.id, request.client_id)
            .await
            .map_err(map_mapping_error)?;

        if let Some(mapping) = &existing {
            if mapping.geometry_hash == hash {
                debug!(
                    geofence_id = %geofence.id,
                    external_id = %mapping.external_geozone_id,
                    "geometry unchanged, skipping external sync"
                );
                return Ok(mapping.external_geozone_id.clone());
            }
        }

        let external_name = format!("{} - {}", request.client_display_name, geofence.name);
        let external_id = self
            .gateway
            .import_geozone(GeozoneImport {
                name: external_name.clone(),
                ring,
            })
            .await
            .map_err(|error| map_gateway_error(error, &format!("geofence {}", geofence.name)))?;

        self.mappings
            .upsert(GeofenceMapping {
                geofence_id: geofence.id,
                client_id: request.client_id,
                external_geozone_id: external_id.clone(),
                geometry_hash: hash,
                external_name,
            })
            .await
            .map_err(map_mapping_error)?;

        // The superseded geozone is removed only after the replacement
        // is confirmed and persisted; a failed delete leaves an orphan
        // externally but never a stale mapping.
        if let Some(previous) = existing {
            if previous.external_geozone_id != external_id {
                if let Err(error) = self
                    .gateway
                    .delete_geozone(previous.external_geozone_id.clone())
                    .await
                {
                    warn!(
                        geofence_id = %geofence.id,
                        external_id = %previous.external_geozone_id,
                        %error,
                        "failed to delete superseded geozone"
                    );
                }
            }
        }

        info!(
            geofence_id = %geofence.id,
            external_id = %external_id,
            itinerary_id = ?request.itinerary_id,
            "geofence synced to external geozone"
        );
        Ok(external_id)
    }
}

#[cfg(test)]
#[path = "geofence_sync_tests.rs"]
mod tests;
