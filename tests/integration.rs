use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cargoflow::api::rest::router;
use cargoflow::state::AppState;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(1024));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-actor-id", "ops-7")
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

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

fn order_body(reference: Option<&str>) -> Value {
    json!({
        "reference_code": reference,
        "customer_name": "Test Customer",
        "customer_phone": "9999999999",
        "customer_email": "customer@test.com",
        "stops": [
            {
                "type": "PICKUP",
                "address_line": "123 Main St",
                "city": "Bengaluru",
                "state": "KA",
                "postal_code": "560001",
                "location": { "lat": 12.97, "lng": 77.59 }
            },
            {
                "type": "DROP",
                "address_line": "456 End St",
                "city": "Bengaluru",
                "state": "KA",
                "postal_code": "560002",
                "location": { "lat": 12.98, "lng": 77.60 }
            }
        ]
    })
}

async fn fleet(app: &axum::Router) -> (String, String) {
    let (status, driver) = send(
        app,
        json_request(
            "POST",
            "/drivers",
            json!({ "name": "Driver User", "phone": "1234567890" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let plate = format!("ka01{}", &Uuid::new_v4().simple().to_string()[..6]);
    let (status, vehicle) = send(
        app,
        json_request(
            "POST",
            "/vehicles",
            json!({ "plate_number": plate, "type": "VAN", "capacity_kg": 500 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vehicle["plate_number"], plate.to_ascii_uppercase());

    (
        driver["id"].as_str().unwrap().to_string(),
        vehicle["id"].as_str().unwrap().to_string(),
    )
}

async fn planned_route(app: &axum::Router, order_ids: Vec<String>) -> Value {
    let (driver_id, vehicle_id) = fleet(app).await;
    let (status, route) = send(
        app,
        json_request(
            "POST",
            "/routes",
            json!({
                "route_date": "2026-10-16",
                "driver_id": driver_id,
                "vehicle_id": vehicle_id,
                "order_ids": order_ids,
                "optimize": false
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{route}");
    route
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["routes"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    send(&app, json_request("POST", "/orders", order_body(None))).await;

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
    assert!(body.contains("transitions_total"));
    assert!(body.contains("routes_in_progress"));
}

#[tokio::test]
async fn create_order_assigns_reference_and_history() {
    let (app, _state) = setup();
    let (status, order) = send(&app, json_request("POST", "/orders", order_body(None))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["reference_code"], "CF-10001");
    assert_eq!(order["status"], "CREATED");
    assert_eq!(order["stops"][0]["sequence_index"], 1);
    assert_eq!(order["stops"][1]["type"], "DROP");

    let id = order["id"].as_str().unwrap();
    let (status, history) = send(&app, get_request(&format!("/orders/{id}/history"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history[0]["to_status"], "CREATED");
    assert_eq!(history[0]["actor_type"], "OPS");
    assert_eq!(history[0]["actor_id"], "ops-7");
}

#[tokio::test]
async fn blank_phone_returns_field_error() {
    let (app, _state) = setup();
    let mut body = order_body(None);
    body["customer_phone"] = json!("  ");

    let (status, error) = send(&app, json_request("POST", "/orders", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["customer_phone"][0], "this field may not be blank");
}

#[tokio::test]
async fn duplicate_reference_returns_409() {
    let (app, _state) = setup();
    send(
        &app,
        json_request("POST", "/orders", order_body(Some("DUPLICATE-001"))),
    )
    .await;

    let (status, error) = send(
        &app,
        json_request("POST", "/orders", order_body(Some("DUPLICATE-001"))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["detail"].as_str().unwrap().contains("DUPLICATE-001"));
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let (app, _state) = setup();
    let (status, error) = send(
        &app,
        get_request("/orders/00000000-0000-0000-0000-000000000000"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(error["detail"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn full_delivery_flow_completes_route() {
    let (app, state) = setup();
    let (_, order) = send(&app, json_request("POST", "/orders", order_body(None))).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let token = order["tracking_token"].as_str().unwrap().to_string();
    assert_eq!(order["reference_code"], "CF-10001");

    let route = planned_route(&app, vec![order_id.clone()]).await;
    let route_id = route["id"].as_str().unwrap().to_string();
    assert_eq!(route["status"], "PLANNED");

    let (status, started) = send(
        &app,
        json_request("POST", &format!("/driver/routes/{route_id}/start"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "IN_PROGRESS");

    for to_status in ["PICKED_UP", "IN_TRANSIT"] {
        let (status, updated) = send(
            &app,
            json_request(
                "POST",
                &format!("/driver/orders/{order_id}/status"),
                json!({ "to_status": to_status }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{updated}");
        assert_eq!(updated["status"], to_status);
    }

    let (status, delivered) = send(
        &app,
        json_request(
            "POST",
            &format!("/driver/orders/{order_id}/pod"),
            json!({ "receiver_name": "A. Sharma" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered["status"], "DELIVERED");
    assert_eq!(delivered["pod"]["receiver_name"], "A. Sharma");
    assert_eq!(delivered["stops"][1]["status"], "COMPLETED");

    let (_, route) = send(&app, get_request(&format!("/routes/{route_id}"))).await;
    assert_eq!(route["status"], "COMPLETED");
    assert!(route["end_time"].is_string());
    assert_eq!(state.metrics.routes_in_progress.get(), 0);

    let (status, view) = send(&app, get_request(&format!("/tracking/{token}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "DELIVERED");
    assert_eq!(view["pod_summary"]["receiver_name"], "A. Sharma");
    assert!(view.get("customer_phone").is_none());

    let (_, history) = send(&app, get_request(&format!("/orders/{order_id}/history"))).await;
    let statuses: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["to_status"].as_str().unwrap())
        .collect();
    assert_eq!(
        statuses,
        ["CREATED", "ASSIGNED", "PICKED_UP", "IN_TRANSIT", "DELIVERED"]
    );
}

#[tokio::test]
async fn invalid_transition_returns_409_naming_the_order() {
    let (app, _state) = setup();
    let (_, order) = send(&app, json_request("POST", "/orders", order_body(None))).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, error) = send(
        &app,
        json_request(
            "POST",
            &format!("/driver/orders/{order_id}/status"),
            json!({ "to_status": "IN_TRANSIT" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    let detail = error["detail"].as_str().unwrap();
    assert!(detail.contains("CF-10001"));
    assert!(detail.contains("CREATED -> IN_TRANSIT"));
}

#[tokio::test]
async fn route_with_assigned_order_is_rejected() {
    let (app, _state) = setup();
    let (_, first) = send(&app, json_request("POST", "/orders", order_body(None))).await;
    let (_, second) = send(&app, json_request("POST", "/orders", order_body(None))).await;
    let first_id = first["id"].as_str().unwrap().to_string();
    let second_id = second["id"].as_str().unwrap().to_string();
    planned_route(&app, vec![first_id.clone()]).await;

    let (driver_id, vehicle_id) = fleet(&app).await;
    let (status, error) = send(
        &app,
        json_request(
            "POST",
            "/routes",
            json!({
                "route_date": "2026-10-16",
                "driver_id": driver_id,
                "vehicle_id": vehicle_id,
                "order_ids": [second_id, first_id]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["detail"].as_str().unwrap().contains("CF-10001"));

    let (_, second) = send(&app, get_request(&format!("/orders/{second_id}"))).await;
    assert_eq!(second["status"], "CREATED");
}

#[tokio::test]
async fn reorder_rejects_partial_stop_list() {
    let (app, _state) = setup();
    let (_, order) = send(&app, json_request("POST", "/orders", order_body(None))).await;
    let route = planned_route(&app, vec![order["id"].as_str().unwrap().to_string()]).await;
    let route_id = route["id"].as_str().unwrap();
    let first_stop = route["stops"][0]["stop_id"].clone();
    let second_stop = route["stops"][1]["stop_id"].clone();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/routes/{route_id}/reorder"),
            json!({ "stop_order": [first_stop] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, reordered) = send(
        &app,
        json_request(
            "POST",
            &format!("/routes/{route_id}/reorder"),
            json!({ "stop_order": [second_stop, first_stop] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reordered["stops"][0]["stop_id"], second_stop);
    assert_eq!(reordered["stops"][0]["sequence_index"], 1);
}

#[tokio::test]
async fn cancel_then_filter_by_status() {
    let (app, _state) = setup();
    let (_, order) = send(&app, json_request("POST", "/orders", order_body(None))).await;
    send(&app, json_request("POST", "/orders", order_body(None))).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            json!({ "reason": "" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, cancelled) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            json!({ "reason": "customer request" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    let (_, listed) = send(&app, get_request("/orders?status=CANCELLED")).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], order_id);
}

#[tokio::test]
async fn exception_workflow_over_http() {
    let (app, _state) = setup();
    let (_, order) = send(&app, json_request("POST", "/orders", order_body(None))).await;

    let (status, exception) = send(
        &app,
        json_request(
            "POST",
            "/exceptions",
            json!({
                "order_id": order["id"],
                "type": "DELAY",
                "description": "Stuck in traffic"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exception["status"], "OPEN");
    assert_eq!(exception["created_by"], "ops-7");
    let id = exception["id"].as_str().unwrap();

    let (status, error) = send(
        &app,
        json_request(
            "POST",
            &format!("/exceptions/{id}/resolve"),
            json!({ "resolution": "rerouted" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["detail"].as_str().unwrap().contains("OPEN -> RESOLVED"));

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/exceptions/{id}/ack"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, resolved) = send(
        &app,
        json_request(
            "POST",
            &format!("/exceptions/{id}/resolve"),
            json!({ "resolution": "rerouted" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "RESOLVED");

    let (_, open) = send(&app, get_request("/exceptions?status=OPEN")).await;
    assert!(open.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_plate_returns_409() {
    let (app, _state) = setup();
    let body = json!({ "plate_number": "KA01AB1234", "type": "TRUCK" });
    let (status, _) = send(&app, json_request("POST", "/vehicles", body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, json_request("POST", "/vehicles", body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_tracking_token_returns_404() {
    let (app, _state) = setup();
    let (status, _) = send(&app, get_request("/tracking/not-a-token")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn driver_location_update_validates_coordinates() {
    let (app, _state) = setup();
    let (driver_id, _) = fleet(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/drivers/{driver_id}/location"),
            json!({ "location": { "lat": 123.0, "lng": 77.0 } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, driver) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/drivers/{driver_id}/location"),
            json!({ "location": { "lat": 12.97, "lng": 77.59 } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(driver["location"]["lat"], 12.97);
    assert!(driver["location_updated_at"].is_string());
}

fn driver_request(method: &str, uri: &str, driver_id: &str, body: Option<Value>) -> Request<Body> {
    let body = match body {
        Some(body) => Body::from(serde_json::to_string(&body).unwrap()),
        None => Body::empty(),
    };
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-actor-id", driver_id)
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn unknown_status_value_returns_field_error() {
    let (app, _state) = setup();
    let (_, order) = send(&app, json_request("POST", "/orders", order_body(None))).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, error) = send(
        &app,
        json_request(
            "POST",
            &format!("/driver/orders/{order_id}/status"),
            json!({ "to_status": "TELEPORTED" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = error["to_status"][0].as_str().unwrap();
    assert!(message.contains("TELEPORTED"), "{message}");
}

#[tokio::test]
async fn malformed_json_returns_body_error() {
    let (app, _state) = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from("{\"customer_name\": "))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert!(error["body"][0].is_string(), "{error}");

    let (status, error) = send(&app, json_request("POST", "/orders", json!({ "stops": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = error["body"][0].as_str().unwrap();
    assert!(message.contains("customer_name"), "{message}");
}

#[tokio::test]
async fn inverted_drop_window_is_rejected() {
    let (app, _state) = setup();
    let mut body = order_body(None);
    body["drop_window_start"] = json!("2026-10-16T14:00:00Z");
    body["drop_window_end"] = json!("2026-10-16T12:00:00Z");

    let (status, error) = send(&app, json_request("POST", "/orders", body.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["drop_window_end"].is_array(), "{error}");

    body["drop_window_end"] = json!("2026-10-16T18:00:00Z");
    let (status, order) = send(&app, json_request("POST", "/orders", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["drop_window_end"], "2026-10-16T18:00:00Z");
    assert!(order["pickup_window_start"].is_null());
}

#[tokio::test]
async fn driver_sees_only_own_routes() {
    let (app, _state) = setup();
    let (_, order) = send(&app, json_request("POST", "/orders", order_body(None))).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let reference = order["reference_code"].as_str().unwrap().to_string();

    let (driver_id, vehicle_id) = fleet(&app).await;
    let today = chrono::Utc::now().date_naive().to_string();
    let (status, route) = send(
        &app,
        json_request(
            "POST",
            "/routes",
            json!({
                "route_date": today,
                "driver_id": driver_id,
                "vehicle_id": vehicle_id,
                "order_ids": [order_id],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{route}");
    let route_id = route["id"].as_str().unwrap().to_string();

    let (status, today_route) = send(
        &app,
        driver_request("GET", "/driver/routes/today", &driver_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{today_route}");
    assert_eq!(today_route["id"], route_id.as_str());
    assert_eq!(today_route["orders"][0]["reference_code"], reference.as_str());

    let (status, scanned) = send(
        &app,
        driver_request(
            "POST",
            "/driver/scan",
            &driver_id,
            Some(json!({ "code": format!(" {reference} ") })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scanned["id"], order_id.as_str());

    let (other_driver, _) = fleet(&app).await;
    let (status, _) = send(
        &app,
        driver_request("GET", &format!("/driver/routes/{route_id}"), &other_driver, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        driver_request("GET", "/driver/routes/today", &other_driver, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        driver_request(
            "POST",
            "/driver/scan",
            &other_driver,
            Some(json!({ "code": reference })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, error) = send(&app, get_request("/driver/routes/today")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["x-actor-id"].is_array());
}
