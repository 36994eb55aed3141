//! Mutex-guarded map adapters for the repository ports.
//!
//! The conditional deployment write holds one lock across lookup and
//! insert, which is what makes it safe against concurrent callers for
//! the same (client, itinerary, vehicle) tuple.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::deployment::Deployment;
use crate::domain::external::{GeofenceMapping, GeozoneGroupMapping, GroupScope};
use crate::domain::fleet::{Geofence, Itinerary, Vehicle};
use crate::domain::ports::{
    DeploymentFilter, DeploymentRepository, DeploymentRepositoryError, DirectoryError,
    FleetDirectory, GeofenceMappingRepository, GeozoneGroupMappingRepository,
    MappingRepositoryError, QueueOutcome,
};

fn poisoned_mapping_lock<T>(_: T) -> MappingRepositoryError {
    MappingRepositoryError::connection("mapping store lock poisoned")
}

fn poisoned_deployment_lock<T>(_: T) -> DeploymentRepositoryError {
    DeploymentRepositoryError::connection("deployment store lock poisoned")
}

/// In-memory geofence mapping store keyed by (geofence, client).
#[derive(Default)]
pub struct InMemoryGeofenceMappingRepository {
    rows: Mutex<HashMap<(Uuid, Uuid), GeofenceMapping>>,
}

impl InMemoryGeofenceMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GeofenceMappingRepository for InMemoryGeofenceMappingRepository {
    async fn find(
        &self,
        geofence_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<GeofenceMapping>, MappingRepositoryError> {
        let rows = self.rows.lock().map_err(poisoned_mapping_lock)?;
        Ok(rows.get(&(geofence_id, client_id)).cloned())
    }

    async fn upsert(&self, mapping: GeofenceMapping) -> Result<(), MappingRepositoryError> {
        let mut rows = self.rows.lock().map_err(poisoned_mapping_lock)?;
        rows.insert((mapping.geofence_id, mapping.client_id), mapping);
        Ok(())
    }
}

/// In-memory group mapping store keyed by (scope, client).
#[derive(Default)]
pub struct InMemoryGeozoneGroupMappingRepository {
    rows: Mutex<HashMap<(GroupScope, Uuid), GeozoneGroupMapping>>,
}

impl InMemoryGeozoneGroupMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GeozoneGroupMappingRepository for InMemoryGeozoneGroupMappingRepository {
    async fn find(
        &self,
        scope: GroupScope,
        client_id: Uuid,
    ) -> Result<Option<GeozoneGroupMapping>, MappingRepositoryError> {
        let rows = self.rows.lock().map_err(poisoned_mapping_lock)?;
        Ok(rows.get(&(scope, client_id)).cloned())
    }

    async fn upsert(&self, mapping: GeozoneGroupMapping) -> Result<(), MappingRepositoryError> {
        let mut rows = self.rows.lock().map_err(poisoned_mapping_lock)?;
        rows.insert((mapping.scope.clone(), mapping.client_id), mapping);
        Ok(())
    }
}

/// In-memory deployment store.
#[derive(Default)]
pub struct InMemoryDeploymentRepository {
    rows: Mutex<HashMap<Uuid, Deployment>>,
}

impl InMemoryDeploymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentRepository for InMemoryDeploymentRepository {
    async fn create_if_no_in_flight(
        &self,
        candidate: Deployment,
    ) -> Result<QueueOutcome, DeploymentRepositoryError> {
        let mut rows = self.rows.lock().map_err(poisoned_deployment_lock)?;
        let in_flight = rows.values().find(|row| {
            row.client_id == candidate.client_id
                && row.itinerary_id == candidate.itinerary_id
                && row.vehicle_id == candidate.vehicle_id
                && row.status.is_in_flight()
        });
        if let Some(existing) = in_flight {
            return Ok(QueueOutcome::Active(existing.clone()));
        }
        rows.insert(candidate.id, candidate.clone());
        Ok(QueueOutcome::Queued(candidate))
    }

    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Deployment>, DeploymentRepositoryError> {
        let rows = self.rows.lock().map_err(poisoned_deployment_lock)?;
        Ok(rows.get(&id).cloned())
    }

    async fn update(&self, deployment: Deployment) -> Result<(), DeploymentRepositoryError> {
        let mut rows = self.rows.lock().map_err(poisoned_deployment_lock)?;
        if !rows.contains_key(&deployment.id) {
            return Err(DeploymentRepositoryError::not_found(deployment.id));
        }
        rows.insert(deployment.id, deployment);
        Ok(())
    }

    async fn list(
        &self,
        client_id: Uuid,
        filter: DeploymentFilter,
    ) -> Result<Vec<Deployment>, DeploymentRepositoryError> {
        let rows = self.rows.lock().map_err(poisoned_deployment_lock)?;
        let mut matches: Vec<Deployment> = rows
            .values()
            .filter(|row| row.client_id == client_id)
            .filter(|row| {
                filter
                    .itinerary_id
                    .is_none_or(|itinerary_id| row.itinerary_id == itinerary_id)
            })
            .filter(|row| {
                filter
                    .vehicle_id
                    .is_none_or(|vehicle_id| row.vehicle_id == vehicle_id)
            })
            .filter(|row| filter.status.is_none_or(|status| row.status == status))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(matches)
    }

    async fn latest_per_vehicle(
        &self,
        client_id: Uuid,
        itinerary_id: Uuid,
    ) -> Result<Vec<Deployment>, DeploymentRepositoryError> {
        let rows = self.rows.lock().map_err(poisoned_deployment_lock)?;
        let mut latest: HashMap<Uuid, Deployment> = HashMap::new();
        for row in rows.values() {
            if row.client_id != client_id || row.itinerary_id != itinerary_id {
                continue;
            }
            let newer = latest
                .get(&row.vehicle_id)
                .is_none_or(|current| row.started_at > current.started_at);
            if newer {
                latest.insert(row.vehicle_id, row.clone());
            }
        }
        Ok(latest.into_values().collect())
    }
}

/// In-memory fleet read side, seeded at wiring time.
#[derive(Default)]
pub struct InMemoryFleetDirectory {
    itineraries: Mutex<HashMap<Uuid, Itinerary>>,
    geofences: Mutex<HashMap<Uuid, Geofence>>,
    vehicles: Mutex<HashMap<Uuid, Vehicle>>,
    client_names: Mutex<HashMap<Uuid, String>>,
}

impl InMemoryFleetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_itinerary(&self, itinerary: Itinerary) {
        if let Ok(mut itineraries) = self.itineraries.lock() {
            itineraries.insert(itinerary.id, itinerary);
        }
    }

    pub fn insert_geofence(&self, geofence: Geofence) {
        if let Ok(mut geofences) = self.geofences.lock() {
            geofences.insert(geofence.id, geofence);
        }
    }

    pub fn insert_vehicle(&self, vehicle: Vehicle) {
        if let Ok(mut vehicles) = self.vehicles.lock() {
            vehicles.insert(vehicle.id, vehicle);
        }
    }

    pub fn insert_client_name(&self, client_id: Uuid, name: impl Into<String>) {
        if let Ok(mut client_names) = self.client_names.lock() {
            client_names.insert(client_id, name.into());
        }
    }
}

fn poisoned_directory_lock<T>(_: T) -> DirectoryError {
    DirectoryError::connection("fleet directory lock poisoned")
}

#[async_trait]
impl FleetDirectory for InMemoryFleetDirectory {
    async fn find_itinerary(
        &self,
        client_id: Uuid,
        itinerary_id: Uuid,
    ) -> Result<Option<Itinerary>, DirectoryError> {
        let itineraries = self.itineraries.lock().map_err(poisoned_directory_lock)?;
        Ok(itineraries
            .get(&itinerary_id)
            .filter(|itinerary| itinerary.client_id == client_id)
            .cloned())
    }

    async fn find_geofences(
        &self,
        client_id: Uuid,
        geofence_ids: Vec<Uuid>,
    ) -> Result<Vec<Geofence>, DirectoryError> {
        let geofences = self.geofences.lock().map_err(poisoned_directory_lock)?;
        Ok(geofence_ids
            .iter()
            .filter_map(|id| geofences.get(id))
            .filter(|geofence| geofence.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn find_vehicles(
        &self,
        client_id: Uuid,
        vehicle_ids: Vec<Uuid>,
    ) -> Result<Vec<Vehicle>, DirectoryError> {
        let vehicles = self.vehicles.lock().map_err(poisoned_directory_lock)?;
        Ok(vehicle_ids
            .iter()
            .filter_map(|id| vehicles.get(id))
            .filter(|vehicle| vehicle.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn client_display_name(
        &self,
        client_id: Uuid,
    ) -> Result<Option<String>, DirectoryError> {
        let client_names = self.client_names.lock().map_err(poisoned_directory_lock)?;
        Ok(client_names.get(&client_id).cloned())
    }
}
