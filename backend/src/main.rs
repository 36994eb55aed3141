//! Backend entry-point: wires the deployment pipeline and REST routes.

use std::env;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use frota_backend::domain::geofence_sync::GeofenceSyncService;
use frota_backend::domain::geozone_group_sync::GeozoneGroupSyncService;
use frota_backend::domain::{ChannelOverrideDispatcher, DeploymentOrchestrator, OverrideWorker};
use frota_backend::inbound::http::{configure, state::HttpState};
use frota_backend::outbound::persistence::{
    InMemoryDeploymentRepository, InMemoryFleetDirectory, InMemoryGeofenceMappingRepository,
    InMemoryGeozoneGroupMappingRepository,
};
use frota_backend::outbound::xdm::{XdmConfig, XdmHttpClient};

const OVERRIDE_CHANNEL_CAPACITY: usize = 256;

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let config = XdmConfig::from_env().map_err(std::io::Error::other)?;
    let override_slots = config.override_slots.clone();
    let max_points = config.max_geofence_points;
    let gateway = Arc::new(XdmHttpClient::new(config).map_err(std::io::Error::other)?);

    let geofence_mappings = Arc::new(InMemoryGeofenceMappingRepository::new());
    let group_mappings = Arc::new(InMemoryGeozoneGroupMappingRepository::new());
    let deployments = Arc::new(InMemoryDeploymentRepository::new());
    let directory = Arc::new(InMemoryFleetDirectory::new());

    let geofence_sync = Arc::new(GeofenceSyncService::new(
        geofence_mappings,
        gateway.clone(),
        max_points,
    ));
    let group_sync = Arc::new(GeozoneGroupSyncService::new(
        geofence_sync,
        group_mappings,
        gateway.clone(),
    ));

    let (dispatcher, jobs) = ChannelOverrideDispatcher::channel(OVERRIDE_CHANNEL_CAPACITY);
    let worker = OverrideWorker::new(gateway, deployments.clone());
    tokio::spawn(worker.run(jobs));

    let orchestrator = Arc::new(DeploymentOrchestrator::new(
        group_sync,
        deployments,
        directory,
        Arc::new(dispatcher),
        override_slots,
    ));
    let state = HttpState::new(orchestrator);

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
