//! Deployment HTTP handlers.
//!
//! ```text
//! POST /api/v1/itineraries/{id}/embark
//! POST /api/v1/itineraries/embark
//! POST /api/v1/itineraries/{id}/disembark
//! GET  /api/v1/itineraries/embark/history
//! GET  /api/v1/deployments/{id}
//! ```
//!
//! Handlers parse and validate DTOs, then call the driving port. Tenant
//! resolution is an external collaborator's job; requests carry the
//! client scope explicitly.

use actix_web::{get, post, web, HttpRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::deployment::Deployment;
use crate::domain::deployment_history::DeploymentHistoryEntry;
use crate::domain::ports::{
    DisembarkRequest, EmbarkRequest, HistoryRequest, RequesterContext, VehicleOutcome,
    VehicleOutcomeStatus,
};
use crate::domain::Error;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::ApiResult;

/// Request payload for embarking one itinerary on a batch of vehicles.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmbarkRequestBody {
    #[schema(format = "uuid")]
    pub client_id: String,
    #[schema(value_type = Vec<uuid::Uuid>)]
    pub vehicle_ids: Vec<String>,
    pub config_id: Option<String>,
    pub dry_run: Option<bool>,
    pub correlation_id: Option<String>,
    #[schema(format = "uuid")]
    pub requested_by_user_id: Option<String>,
    pub requested_by_name: Option<String>,
}

/// Request payload for the itineraries × vehicles cross-product batch.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchEmbarkRequestBody {
    #[schema(format = "uuid")]
    pub client_id: String,
    #[schema(value_type = Vec<uuid::Uuid>)]
    pub itinerary_ids: Vec<String>,
    #[schema(value_type = Vec<uuid::Uuid>)]
    pub vehicle_ids: Vec<String>,
    pub config_id: Option<String>,
    pub dry_run: Option<bool>,
    pub correlation_id: Option<String>,
    #[schema(format = "uuid")]
    pub requested_by_user_id: Option<String>,
    pub requested_by_name: Option<String>,
}

/// Request payload for disembarking one itinerary.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisembarkRequestBody {
    #[schema(format = "uuid")]
    pub client_id: String,
    #[schema(value_type = Vec<uuid::Uuid>)]
    pub vehicle_ids: Vec<String>,
    pub config_id: Option<String>,
    #[schema(format = "uuid")]
    pub requested_by_user_id: Option<String>,
    pub requested_by_name: Option<String>,
}

/// Per-vehicle result of a batch request.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleOutcomeBody {
    pub vehicle_id: Uuid,
    pub status: VehicleOutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<VehicleOutcome> for VehicleOutcomeBody {
    fn from(outcome: VehicleOutcome) -> Self {
        Self {
            vehicle_id: outcome.vehicle_id,
            status: outcome.status,
            deployment_id: outcome.deployment_id,
            message: outcome.message,
        }
    }
}

/// Per-itinerary slice of a cross-product batch response.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryOutcomesBody {
    pub itinerary_id: Uuid,
    pub outcomes: Vec<VehicleOutcomeBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// History listing filters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub client_id: String,
    pub itinerary_id: Option<String>,
    pub vehicle_id: Option<String>,
}

/// Client scope for single-deployment reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientScopeQuery {
    pub client_id: String,
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(value).map_err(|_| {
        Error::invalid_request(format!("{field} must be a UUID")).with_details(json!({
            "field": field,
            "value": value,
        }))
    })
}

fn parse_uuid_list(values: &[String], field: &str) -> Result<Vec<Uuid>, Error> {
    if values.is_empty() {
        return Err(
            Error::invalid_request(format!("{field} must not be empty"))
                .with_details(json!({ "field": field })),
        );
    }
    values
        .iter()
        .map(|value| parse_uuid(value, field))
        .collect()
}

fn parse_optional_uuid(value: Option<&String>, field: &str) -> Result<Option<Uuid>, Error> {
    value.map(|value| parse_uuid(value, field)).transpose()
}

fn requester_from(
    request: &HttpRequest,
    user_id: Option<&String>,
    name: Option<String>,
) -> Result<RequesterContext, Error> {
    Ok(RequesterContext {
        user_id: parse_optional_uuid(user_id, "requestedByUserId")?,
        name,
        ip_address: request
            .connection_info()
            .realip_remote_addr()
            .map(str::to_owned),
    })
}

/// Embark one itinerary on a batch of vehicles.
#[utoipa::path(
    post,
    path = "/api/v1/itineraries/{itinerary_id}/embark",
    params(("itinerary_id" = String, Path, description = "Itinerary to embark")),
    request_body = EmbarkRequestBody,
    responses(
        (status = 200, description = "Per-vehicle outcomes", body = Vec<VehicleOutcomeBody>),
        (status = 400, description = "Invalid request", body = Error),
        (status = 404, description = "Itinerary not found", body = Error),
        (status = 413, description = "Geometry rejected for size", body = Error),
        (status = 503, description = "Collaborator unavailable", body = Error)
    ),
    tags = ["deployments"],
    operation_id = "embarkItinerary"
)]
#[post("/itineraries/{itinerary_id}/embark")]
pub async fn embark_itinerary(
    state: web::Data<HttpState>,
    request: HttpRequest,
    path: web::Path<String>,
    payload: web::Json<EmbarkRequestBody>,
) -> ApiResult<web::Json<Vec<VehicleOutcomeBody>>> {
    let body = payload.into_inner();
    let itinerary_id = parse_uuid(&path, "itineraryId")?;
    let client_id = parse_uuid(&body.client_id, "clientId")?;
    let vehicle_ids = parse_uuid_list(&body.vehicle_ids, "vehicleIds")?;
    let requester = requester_from(
        &request,
        body.requested_by_user_id.as_ref(),
        body.requested_by_name,
    )?;

    let outcomes = state
        .deployment
        .embark_itinerary(EmbarkRequest {
            client_id,
            itinerary_id,
            vehicle_ids,
            config_id: body.config_id,
            dry_run: body.dry_run.unwrap_or(false),
            geofences_by_id: None,
            correlation_id: body.correlation_id,
            requester,
        })
        .await?;

    Ok(web::Json(
        outcomes.into_iter().map(VehicleOutcomeBody::from).collect(),
    ))
}

/// Embark every listed itinerary on every listed vehicle.
///
/// Itineraries are processed independently; a failure for one is
/// reported in its slice of the response rather than aborting the rest.
#[utoipa::path(
    post,
    path = "/api/v1/itineraries/embark",
    request_body = BatchEmbarkRequestBody,
    responses(
        (status = 200, description = "Per-itinerary outcome slices", body = Vec<ItineraryOutcomesBody>),
        (status = 400, description = "Invalid request", body = Error)
    ),
    tags = ["deployments"],
    operation_id = "embarkItineraryBatch"
)]
#[post("/itineraries/embark")]
pub async fn embark_itinerary_batch(
    state: web::Data<HttpState>,
    request: HttpRequest,
    payload: web::Json<BatchEmbarkRequestBody>,
) -> ApiResult<web::Json<Vec<ItineraryOutcomesBody>>> {
    let body = payload.into_inner();
    let client_id = parse_uuid(&body.client_id, "clientId")?;
    let itinerary_ids = parse_uuid_list(&body.itinerary_ids, "itineraryIds")?;
    let vehicle_ids = parse_uuid_list(&body.vehicle_ids, "vehicleIds")?;
    let requester = requester_from(
        &request,
        body.requested_by_user_id.as_ref(),
        body.requested_by_name,
    )?;

    let mut slices = Vec::with_capacity(itinerary_ids.len());
    for itinerary_id in itinerary_ids {
        let result = state
            .deployment
            .embark_itinerary(EmbarkRequest {
                client_id,
                itinerary_id,
                vehicle_ids: vehicle_ids.clone(),
                config_id: body.config_id.clone(),
                dry_run: body.dry_run.unwrap_or(false),
                geofences_by_id: None,
                correlation_id: body.correlation_id.clone(),
                requester: requester.clone(),
            })
            .await;
        slices.push(match result {
            Ok(outcomes) => ItineraryOutcomesBody {
                itinerary_id,
                outcomes: outcomes.into_iter().map(VehicleOutcomeBody::from).collect(),
                error: None,
            },
            Err(error) => ItineraryOutcomesBody {
                itinerary_id,
                outcomes: Vec::new(),
                error: Some(error.message().to_owned()),
            },
        });
    }
    Ok(web::Json(slices))
}

/// Disembark one itinerary from a batch of vehicles.
#[utoipa::path(
    post,
    path = "/api/v1/itineraries/{itinerary_id}/disembark",
    params(("itinerary_id" = String, Path, description = "Itinerary to disembark")),
    request_body = DisembarkRequestBody,
    responses(
        (status = 200, description = "Per-vehicle outcomes", body = Vec<VehicleOutcomeBody>),
        (status = 400, description = "Invalid request", body = Error),
        (status = 404, description = "Itinerary not found", body = Error)
    ),
    tags = ["deployments"],
    operation_id = "disembarkItinerary"
)]
#[post("/itineraries/{itinerary_id}/disembark")]
pub async fn disembark_itinerary(
    state: web::Data<HttpState>,
    request: HttpRequest,
    path: web::Path<String>,
    payload: web::Json<DisembarkRequestBody>,
) -> ApiResult<web::Json<Vec<VehicleOutcomeBody>>> {
    let body = payload.into_inner();
    let itinerary_id = parse_uuid(&path, "itineraryId")?;
    let client_id = parse_uuid(&body.client_id, "clientId")?;
    let vehicle_ids = parse_uuid_list(&body.vehicle_ids, "vehicleIds")?;
    let requester = requester_from(
        &request,
        body.requested_by_user_id.as_ref(),
        body.requested_by_name,
    )?;

    let outcomes = state
        .deployment
        .disembark_itinerary(DisembarkRequest {
            client_id,
            itinerary_id,
            vehicle_ids,
            config_id: body.config_id,
            requester,
        })
        .await?;

    Ok(web::Json(
        outcomes.into_iter().map(VehicleOutcomeBody::from).collect(),
    ))
}

/// List deployment history for audit display.
#[utoipa::path(
    get,
    path = "/api/v1/itineraries/embark/history",
    params(
        ("clientId" = String, Query, description = "Owning client scope"),
        ("itineraryId" = Option<String>, Query, description = "Filter by itinerary"),
        ("vehicleId" = Option<String>, Query, description = "Filter by vehicle")
    ),
    responses(
        (status = 200, description = "History entries, newest first", body = Vec<DeploymentHistoryEntry>),
        (status = 400, description = "Invalid request", body = Error)
    ),
    tags = ["deployments"],
    operation_id = "deploymentHistory"
)]
#[get("/itineraries/embark/history")]
pub async fn deployment_history(
    state: web::Data<HttpState>,
    query: web::Query<HistoryQuery>,
) -> ApiResult<web::Json<Vec<DeploymentHistoryEntry>>> {
    let query = query.into_inner();
    let client_id = parse_uuid(&query.client_id, "clientId")?;
    let request = HistoryRequest {
        itinerary_id: parse_optional_uuid(query.itinerary_id.as_ref(), "itineraryId")?,
        vehicle_id: parse_optional_uuid(query.vehicle_id.as_ref(), "vehicleId")?,
    };

    let entries = state.deployment.deployment_history(client_id, request).await?;
    Ok(web::Json(entries))
}

/// Fetch one deployment record.
#[utoipa::path(
    get,
    path = "/api/v1/deployments/{deployment_id}",
    params(
        ("deployment_id" = String, Path, description = "Deployment id"),
        ("clientId" = String, Query, description = "Owning client scope")
    ),
    responses(
        (status = 200, description = "Deployment record", body = Deployment),
        (status = 404, description = "Deployment not found", body = Error)
    ),
    tags = ["deployments"],
    operation_id = "getDeployment"
)]
#[get("/deployments/{deployment_id}")]
pub async fn get_deployment(
    state: web::Data<HttpState>,
    path: web::Path<String>,
    query: web::Query<ClientScopeQuery>,
) -> ApiResult<web::Json<Deployment>> {
    let deployment_id = parse_uuid(&path, "deploymentId")?;
    let client_id = parse_uuid(&query.client_id, "clientId")?;

    let deployment = state
        .deployment
        .get_deployment(client_id, deployment_id)
        .await?;
    Ok(web::Json(deployment))
}

#[cfg(test)]
#[path = "deployments_tests.rs"]
mod tests;
