use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use parcel_tracker::api::rest::router;
use parcel_tracker::codec::polyline::{PROVIDER_PRECISION, encode_polyline};
use parcel_tracker::error::AppError;
use parcel_tracker::models::path::GeoPoint;
use parcel_tracker::routing::{
    DirectionsRequest, DirectionsResponse, DirectionsStatus, EncodedPolyline, Leg, Route,
    RoutingProvider, Step,
};
use parcel_tracker::state::{AppState, EngineSettings};
use parcel_tracker::store::Repositories;
use serde_json::{Value, json};
use tower::ServiceExt;

/// One two-point leg per hop between the requested stops.
struct CannedDirections {
    status: DirectionsStatus,
}

#[async_trait]
impl RoutingProvider for CannedDirections {
    async fn route(&self, request: DirectionsRequest) -> Result<DirectionsResponse, AppError> {
        if self.status != DirectionsStatus::Ok {
            return Ok(DirectionsResponse {
                status: self.status.clone(),
                routes: Vec::new(),
            });
        }

        let legs = (0..=request.waypoints.len())
            .map(|hop| {
                let start = 40.0 + hop as f64 * 0.01;
                let points = [GeoPoint::new(start, 49.8), GeoPoint::new(start + 0.01, 49.81)];
                Leg {
                    steps: vec![Step {
                        polyline: EncodedPolyline {
                            points: encode_polyline(&points, PROVIDER_PRECISION),
                        },
                    }],
                }
            })
            .collect();

        Ok(DirectionsResponse {
            status: DirectionsStatus::Ok,
            routes: vec![Route { legs }],
        })
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        tick_interval: Duration::from_millis(100),
        ..EngineSettings::default()
    }
}

fn setup_with(status: DirectionsStatus) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        Repositories::in_memory(),
        Arc::new(CannedDirections { status }),
        settings(),
        1024,
    ));
    (router(state.clone()), state)
}

fn setup() -> (axum::Router, Arc<AppState>) {
    setup_with(DirectionsStatus::Ok)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn create_parcel(app: &axum::Router, name: &str, user_id: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/parcels",
            json!({
                "origin": format!("{name} origin"),
                "destination": format!("{name} destination"),
                "description": format!("{name} contents"),
                "userId": user_id
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

/// Waits for the background route acquisition to land on the parcel.
async fn routed_parcel(app: &axum::Router, id: &str) -> Value {
    for _ in 0..50 {
        let response = app
            .clone()
            .oneshot(get_request(&format!("/parcels/{id}")))
            .await
            .unwrap();
        let body = body_json(response).await;
        if !body["paths"].as_array().unwrap().is_empty() {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("route for parcel {id} never stored");
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["parcels"], 0);
    assert_eq!(body["vehicles"], 0);
    assert_eq!(body["activeSimulations"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_simulations"));
}

#[tokio::test]
async fn intake_returns_parcel_and_stores_route_in_background() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, "tea", "user-1").await;

    assert_eq!(parcel["status"], "Inventory");
    assert_eq!(parcel["userId"], "user-1");
    assert_eq!(parcel["paths"].as_array().unwrap().len(), 0);

    let routed = routed_parcel(&app, parcel["id"].as_str().unwrap()).await;
    assert_eq!(routed["paths"].as_array().unwrap().len(), 2);
    assert_eq!(routed["path"][0]["lat"], 40.0);
    assert!(routed.get("pathError").is_none());

    let metrics = body_string(app.oneshot(get_request("/metrics")).await.unwrap()).await;
    assert!(metrics.contains("route_acquisitions_total{outcome=\"success\"} 1"));
}

#[tokio::test]
async fn intake_with_blank_description_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/parcels",
            json!({
                "origin": "Baku",
                "destination": "Ganja",
                "description": " ",
                "userId": "user-1"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_records_return_404() {
    let (app, _state) = setup();
    let id = uuid::Uuid::new_v4();

    for uri in [format!("/parcels/{id}"), format!("/vehicles/{id}")] {
        let response = app.clone().oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app
        .oneshot(json_request(
            "POST",
            "/dispatch",
            json!({ "parcelIds": [id] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dispatch_with_no_parcels_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/dispatch", json!({ "parcelIds": [] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dispatch_without_route_returns_422_and_changes_nothing() {
    let (app, state) = setup_with(DirectionsStatus::ZeroResults);
    let parcel = create_parcel(&app, "lost", "user-1").await;
    let id = parcel["id"].as_str().unwrap().to_string();

    // let the background acquisition fail first
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/dispatch", json!({ "parcelIds": [id] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(app.oneshot(get_request(&format!("/parcels/{id}"))).await.unwrap()).await;
    assert_eq!(body["status"], "Inventory");
    assert!(state.repos.vehicles.list_vehicles().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dispatched_vehicle_is_simulated_to_completion() {
    let (app, state) = setup();
    let first = create_parcel(&app, "p1", "user-1").await;
    let second = create_parcel(&app, "p2", "user-1").await;
    let ids = [
        first["id"].as_str().unwrap().to_string(),
        second["id"].as_str().unwrap().to_string(),
    ];
    for id in &ids {
        routed_parcel(&app, id).await;
    }

    let response = app
        .clone()
        .oneshot(json_request("POST", "/dispatch", json!({ "parcelIds": ids })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let vehicle = body_json(response).await;
    assert_eq!(vehicle["status"], "delivery");
    assert_eq!(vehicle["deliveryProgress"], 0.0);
    // origin, two stopovers between the parcels, destination: three hops
    assert_eq!(vehicle["paths"].as_array().unwrap().len(), 6);
    let vehicle_id = vehicle["id"].as_str().unwrap().to_string();

    for id in &ids {
        let body = body_json(
            app.clone()
                .oneshot(get_request(&format!("/parcels/{id}")))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["status"], "In Delivery");
    }

    let simulation_uri = format!("/vehicles/{vehicle_id}/simulation");
    let response = app
        .clone()
        .oneshot(json_request("POST", &simulation_uri, json!({ "speed": 100.0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["speed"], 100.0);

    let response = app
        .clone()
        .oneshot(json_request("POST", &simulation_uri, json!({ "speed": 1.0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // 100x covers the route in six ticks
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(state.simulations.active_count(), 0);

    let body = body_json(
        app.clone()
            .oneshot(get_request(&format!("/vehicles/{vehicle_id}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["status"], "idle");
    assert_eq!(body["deliveryProgress"], 0.0);
    assert_eq!(body["parcels"].as_array().unwrap().len(), 0);
    assert_eq!(body["paths"].as_array().unwrap().len(), 0);
    assert!(body["simulation"].is_null());

    for id in &ids {
        let body = body_json(
            app.clone()
                .oneshot(get_request(&format!("/parcels/{id}")))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["status"], "Delivered");
    }

    let response = app
        .oneshot(json_request("POST", &simulation_uri, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test(start_paused = true)]
async fn simulation_speed_can_change_and_stop() {
    let (app, state) = setup();
    let parcel = create_parcel(&app, "slow", "user-1").await;
    let id = parcel["id"].as_str().unwrap().to_string();
    routed_parcel(&app, &id).await;

    let vehicle = body_json(
        app.clone()
            .oneshot(json_request("POST", "/dispatch", json!({ "parcelIds": [id] })))
            .await
            .unwrap(),
    )
    .await;
    let simulation_uri = format!("/vehicles/{}/simulation", vehicle["id"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(json_request("POST", &simulation_uri, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["speed"], 1.0);

    let response = app
        .clone()
        .oneshot(json_request("PATCH", &simulation_uri, json!({ "speed": 0.0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request("PATCH", &simulation_uri, json!({ "speed": 12.5 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["speed"], 12.5);

    let response = app
        .clone()
        .oneshot(delete_request(&simulation_uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.simulations.active_count(), 0);

    let response = app.oneshot(delete_request(&simulation_uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_change_moves_parcels_back_to_inventory() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, "returned", "user-1").await;
    let id = parcel["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/parcels/status",
            json!({ "parcelIds": [id], "status": "Delivered" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await[0]["status"], "Delivered");

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/parcels/status",
            json!({ "parcelIds": [id], "status": "Inventory" }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await[0]["status"], "Inventory");

    let response = app
        .oneshot(json_request(
            "PATCH",
            "/parcels/status",
            json!({ "parcelIds": [id], "status": "Lost" }),
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn user_parcels_are_filtered_by_owner() {
    let (app, _state) = setup();
    create_parcel(&app, "a", "user-1").await;
    create_parcel(&app, "b", "user-2").await;
    create_parcel(&app, "c", "user-1").await;

    let response = app
        .clone()
        .oneshot(get_request("/users/user-1/parcels"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let owned = body.as_array().unwrap();
    assert_eq!(owned.len(), 2);
    assert!(owned.iter().all(|parcel| parcel["userId"] == "user-1"));

    let body = body_json(app.oneshot(get_request("/users/nobody/parcels")).await.unwrap()).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn malformed_stored_path_is_reported_per_record() {
    let (app, state) = setup();
    let broken = create_parcel(&app, "broken", "user-1").await;
    let healthy = create_parcel(&app, "healthy", "user-1").await;
    let broken_id = broken["id"].as_str().unwrap().to_string();
    routed_parcel(&app, &broken_id).await;
    routed_parcel(&app, healthy["id"].as_str().unwrap()).await;

    state
        .repos
        .parcels
        .update_parcel(
            broken_id.parse().unwrap(),
            parcel_tracker::models::parcel::ParcelUpdate::paths(vec!["40.1/49.8".to_string()]),
        )
        .await
        .unwrap();

    let body = body_json(app.oneshot(get_request("/parcels")).await.unwrap()).await;
    let parcels = body.as_array().unwrap();
    assert_eq!(parcels.len(), 2);

    let broken = parcels.iter().find(|p| p["id"] == broken_id.as_str()).unwrap();
    assert!(broken["pathError"].as_str().unwrap().contains("record 0"));
    assert!(broken.get("path").is_none());

    let healthy = parcels.iter().find(|p| p["id"] != broken_id.as_str()).unwrap();
    assert_eq!(healthy["path"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unrouted_paths_return_404() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/index.html")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn vehicle_route_is_refreshed_from_its_parcels() {
    let (app, state) = setup();
    let parcel = create_parcel(&app, "solo", "user-1").await;
    let parcel_id = parcel["id"].as_str().unwrap().to_string();
    routed_parcel(&app, &parcel_id).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/dispatch", json!({ "parcelIds": [parcel_id] })))
        .await
        .unwrap();
    let vehicle = body_json(response).await;
    let vehicle_id = vehicle["id"].as_str().unwrap().to_string();

    state
        .repos
        .vehicles
        .update_vehicle(
            vehicle_id.parse().unwrap(),
            parcel_tracker::models::vehicle::VehicleUpdate::paths(vec!["40.1/49.8".to_string()]),
        )
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/vehicles/{vehicle_id}/route"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["paths"], vehicle["paths"]);
    assert_eq!(body["path"].as_array().unwrap().len(), 2);
    assert!(body.get("pathError").is_none());

    let missing = uuid::Uuid::new_v4();
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/vehicles/{missing}/route"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
