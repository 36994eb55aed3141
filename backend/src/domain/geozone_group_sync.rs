//! Idempotent sync of geozone groups.
//!
//! A group represents the full set of geofences referenced by an
//! itinerary (or an ad-hoc set). Members are synced first, cascading
//! the per-geofence hash check, then the member-set hash over the
//! sorted external ids gates the group write itself.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use super::external::{ExternalGeozoneId, ExternalGroupId, GeozoneGroupMapping, GroupScope};
use super::fleet::{Geofence, Itinerary};
use super::geofence_sync::{
    map_gateway_error, map_mapping_error, GeofenceSyncService, SyncGeofenceRequest,
};
use super::ports::{DeviceConfigGateway, GeozoneGroupMappingRepository};
use super::Error;

/// Shared context for one group sync.
#[derive(Debug, Clone)]
pub struct GroupSyncContext {
    pub client_id: Uuid,
    pub client_display_name: String,
    /// Member geofences, pre-resolved by the caller.
    pub geofences_by_id: HashMap<Uuid, Geofence>,
}

/// Parameters for an ad-hoc (non-itinerary) group sync.
#[derive(Debug, Clone)]
pub struct AdHocGroupRequest {
    pub scope_key: String,
    pub group_name: String,
    pub geofence_ids: Vec<Uuid>,
}

/// Hash the sorted external member ids.
fn member_set_hash(member_ids: &[ExternalGeozoneId]) -> String {
    let mut sorted: Vec<&str> = member_ids.iter().map(ExternalGeozoneId::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Hash-gated sync of geozone groups.
pub struct GeozoneGroupSyncService {
    geofence_sync: Arc<GeofenceSyncService>,
    groups: Arc<dyn GeozoneGroupMappingRepository>,
    gateway: Arc<dyn DeviceConfigGateway>,
}

impl GeozoneGroupSyncService {
    pub fn new(
        geofence_sync: Arc<GeofenceSyncService>,
        groups: Arc<dyn GeozoneGroupMappingRepository>,
        gateway: Arc<dyn DeviceConfigGateway>,
    ) -> Self {
        Self {
            geofence_sync,
            groups,
            gateway,
        }
    }

    /// Ensure the group for one itinerary exists externally.
    ///
    /// Calling this twice with unchanged itinerary contents and
    /// unchanged member geometry performs exactly one external
    /// group write in total.
    pub async fn ensure_group(
        &self,
        itinerary: &Itinerary,
        ctx: &GroupSyncContext,
    ) -> Result<ExternalGroupId, Error> {
        let name = format!("{} - {}", ctx.client_display_name, itinerary.name);
        self.sync_scope(
            GroupScope::Itinerary(itinerary.id),
            name,
            &itinerary.geofence_ids(),
            Some(itinerary.id),
            ctx,
        )
        .await
    }

    /// Ensure a group for an ad-hoc geofence set exists externally.
    pub async fn sync_group_for_geofences(
        &self,
        request: AdHocGroupRequest,
        ctx: &GroupSyncContext,
    ) -> Result<ExternalGroupId, Error> {
        self.sync_scope(
            GroupScope::AdHoc(request.scope_key),
            request.group_name,
            &request.geofence_ids,
            None,
            ctx,
        )
        .await
    }

    async fn sync_scope(
        &self,
        scope: GroupScope,
        name: String,
        geofence_ids: &[Uuid],
        itinerary_id: Option<Uuid>,
        ctx: &GroupSyncContext,
    ) -> Result<ExternalGroupId, Error> {
        let mut member_ids = Vec::with_capacity(geofence_ids.len());
        for geofence_id in geofence_ids {
            let geofence = ctx.geofences_by_id.get(geofence_id).ok_or_else(|| {
                Error::invalid_request(format!(
                    "geofence {geofence_id} is not available in the client scope"
                ))
            })?;
            let external_id = self
                .geofence_sync
                .sync_geofence(SyncGeofenceRequest {
                    client_id: ctx.client_id,
                    client_display_name: ctx.client_display_name.clone(),
                    geofence: geofence.clone(),
                    itinerary_id,
                })
                .await?;
            member_ids.push(external_id);
        }

        let hash = member_set_hash(&member_ids);
        let existing = self
            .groups
            .find(scope.clone(), ctx.client_id)
            .await
            .map_err(map_mapping_error)?;

        if let Some(mapping) = &existing {
            if mapping.member_set_hash == hash {
                debug!(
                    %scope,
                    group_id = %mapping.external_group_id,
                    "member set unchanged, skipping external group write"
                );
                return Ok(mapping.external_group_id.clone());
            }
        }

        let group_id = self
            .gateway
            .upsert_geozone_group(
                existing.map(|mapping| mapping.external_group_id),
                name,
                member_ids,
            )
            .await
            .map_err(|error| map_gateway_error(error, &format!("geozone group {scope}")))?;

        self.groups
            .upsert(GeozoneGroupMapping {
                scope: scope.clone(),
                client_id: ctx.client_id,
                external_group_id: group_id.clone(),
                member_set_hash: hash,
            })
            .await
            .map_err(map_mapping_error)?;

        info!(%scope, group_id = %group_id, "geozone group synced");
        Ok(group_id)
    }
}

#[cfg(test)]
#[path = "geozone_group_sync_tests.rs"]
mod tests;
