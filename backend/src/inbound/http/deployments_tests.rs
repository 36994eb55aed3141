//! Tests for deployment HTTP handlers.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{test as actix_test, web, App};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use super::*;
use crate::domain::deployment::{DeploymentAction, DeploymentStatus, NewDeployment};
use crate::domain::deployment_history::project;
use crate::domain::ports::MockItineraryDeployment;

fn test_app(
    mock: MockItineraryDeployment,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let state = HttpState::new(Arc::new(mock));
    App::new().app_data(web::Data::new(state)).service(
        web::scope("/api/v1")
            .service(embark_itinerary)
            .service(embark_itinerary_batch)
            .service(disembark_itinerary)
            .service(deployment_history)
            .service(get_deployment),
    )
}

fn embark_payload(client_id: Uuid, vehicle_id: Uuid) -> Value {
    json!({
        "clientId": client_id.to_string(),
        "vehicleIds": [vehicle_id.to_string()],
        "configId": "cfg-7",
        "requestedByName": "operador",
    })
}

fn sample_deployment(client_id: Uuid) -> Deployment {
    Deployment::new(
        NewDeployment {
            client_id,
            itinerary_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            device_uid: "uid-1".to_owned(),
            action: DeploymentAction::Embark,
            external_group_id: None,
            itinerary_name: "Rota Centro".to_owned(),
            vehicle_label: "ABC-1234".to_owned(),
            requested_by_user_id: None,
            requested_by_name: Some("operador".to_owned()),
            ip_address: None,
        },
        Utc::now(),
    )
}

#[actix_web::test]
async fn embark_forwards_the_parsed_request_and_returns_outcomes() {
    let client_id = Uuid::new_v4();
    let itinerary_id = Uuid::new_v4();
    let vehicle_id = Uuid::new_v4();
    let deployment_id = Uuid::new_v4();

    let mut mock = MockItineraryDeployment::new();
    mock.expect_embark_itinerary()
        .times(1)
        .withf(move |request| {
            request.client_id == client_id
                && request.itinerary_id == itinerary_id
                && request.vehicle_ids == vec![vehicle_id]
                && request.config_id.as_deref() == Some("cfg-7")
                && !request.dry_run
                && request.requester.name.as_deref() == Some("operador")
        })
        .return_once(move |_| {
            Ok(vec![VehicleOutcome {
                vehicle_id,
                status: VehicleOutcomeStatus::Queued,
                deployment_id: Some(deployment_id),
                message: None,
            }])
        });

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::post()
        .uri(&format!("/api/v1/itineraries/{itinerary_id}/embark"))
        .set_json(embark_payload(client_id, vehicle_id))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body[0]["status"], "queued");
    assert_eq!(body[0]["deploymentId"], deployment_id.to_string());
}

#[actix_web::test]
async fn embark_rejects_a_malformed_vehicle_id() {
    let mut mock = MockItineraryDeployment::new();
    mock.expect_embark_itinerary().times(0);

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::post()
        .uri(&format!("/api/v1/itineraries/{}/embark", Uuid::new_v4()))
        .set_json(json!({
            "clientId": Uuid::new_v4().to_string(),
            "vehicleIds": ["not-a-uuid"],
        }))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["code"], "invalid_request");
    assert_eq!(body["details"]["field"], "vehicleIds");
}

#[actix_web::test]
async fn embark_rejects_an_empty_vehicle_list() {
    let mut mock = MockItineraryDeployment::new();
    mock.expect_embark_itinerary().times(0);

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::post()
        .uri(&format!("/api/v1/itineraries/{}/embark", Uuid::new_v4()))
        .set_json(json!({
            "clientId": Uuid::new_v4().to_string(),
            "vehicleIds": [],
        }))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unknown_itinerary_maps_to_404() {
    let mut mock = MockItineraryDeployment::new();
    mock.expect_embark_itinerary()
        .times(1)
        .return_once(|_| Err(Error::not_found("itinerary not found")));

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::post()
        .uri(&format!("/api/v1/itineraries/{}/embark", Uuid::new_v4()))
        .set_json(embark_payload(Uuid::new_v4(), Uuid::new_v4()))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn size_rejection_maps_to_413() {
    let mut mock = MockItineraryDeployment::new();
    mock.expect_embark_itinerary().times(1).return_once(|_| {
        Err(Error::payload_too_large(
            "geofence Centro was rejected by the device-configuration service for size",
        ))
    });

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::post()
        .uri(&format!("/api/v1/itineraries/{}/embark", Uuid::new_v4()))
        .set_json(embark_payload(Uuid::new_v4(), Uuid::new_v4()))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["code"], "payload_too_large");
}

#[actix_web::test]
async fn batch_embark_isolates_a_failing_itinerary() {
    let vehicle_id = Uuid::new_v4();
    let good = Uuid::new_v4();
    let bad = Uuid::new_v4();

    let mut mock = MockItineraryDeployment::new();
    mock.expect_embark_itinerary()
        .times(2)
        .returning(move |request| {
            if request.itinerary_id == bad {
                Err(Error::not_found(format!(
                    "itinerary {} not found",
                    request.itinerary_id
                )))
            } else {
                Ok(vec![VehicleOutcome {
                    vehicle_id,
                    status: VehicleOutcomeStatus::Queued,
                    deployment_id: Some(Uuid::new_v4()),
                    message: None,
                }])
            }
        });

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::post()
        .uri("/api/v1/itineraries/embark")
        .set_json(json!({
            "clientId": Uuid::new_v4().to_string(),
            "itineraryIds": [good.to_string(), bad.to_string()],
            "vehicleIds": [vehicle_id.to_string()],
        }))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));
    assert_eq!(body[0]["outcomes"][0]["status"], "queued");
    assert!(body[0].get("error").is_none());
    assert!(body[1]["error"]
        .as_str()
        .is_some_and(|message| message.contains("not found")));
}

#[actix_web::test]
async fn disembark_calls_the_port_with_the_itinerary_scope() {
    let itinerary_id = Uuid::new_v4();
    let vehicle_id = Uuid::new_v4();

    let mut mock = MockItineraryDeployment::new();
    mock.expect_disembark_itinerary()
        .times(1)
        .withf(move |request| {
            request.itinerary_id == itinerary_id && request.vehicle_ids == vec![vehicle_id]
        })
        .return_once(move |_| {
            Ok(vec![VehicleOutcome {
                vehicle_id,
                status: VehicleOutcomeStatus::Queued,
                deployment_id: Some(Uuid::new_v4()),
                message: None,
            }])
        });

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::post()
        .uri(&format!("/api/v1/itineraries/{itinerary_id}/disembark"))
        .set_json(json!({
            "clientId": Uuid::new_v4().to_string(),
            "vehicleIds": [vehicle_id.to_string()],
        }))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[actix_web::test]
async fn history_returns_projected_entries() {
    let client_id = Uuid::new_v4();
    let mut record = sample_deployment(client_id);
    record.status = DeploymentStatus::Deployed;
    let entry = project(&record);

    let mut mock = MockItineraryDeployment::new();
    mock.expect_deployment_history()
        .times(1)
        .withf(move |scope, request| *scope == client_id && request.itinerary_id.is_none())
        .return_once(move |_, _| Ok(vec![entry]));

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::get()
        .uri(&format!(
            "/api/v1/itineraries/embark/history?clientId={client_id}"
        ))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body[0]["statusLabel"], "EMBARCADO");
    assert_eq!(body[0]["actionLabel"], "EMBARQUE");
}

#[actix_web::test]
async fn get_deployment_returns_the_record() {
    let client_id = Uuid::new_v4();
    let record = sample_deployment(client_id);
    let deployment_id = record.id;

    let mut mock = MockItineraryDeployment::new();
    mock.expect_get_deployment()
        .times(1)
        .withf(move |scope, id| *scope == client_id && *id == deployment_id)
        .return_once(move |_, _| Ok(record));

    let app = actix_test::init_service(test_app(mock)).await;
    let request = actix_test::TestRequest::get()
        .uri(&format!(
            "/api/v1/deployments/{deployment_id}?clientId={client_id}"
        ))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["id"], deployment_id.to_string());
    assert_eq!(body["status"], "QUEUED");
}
