//! End-to-end tests of the REST surface over the in-memory store.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};

use neoride_service::{router, with_middleware};
use neoride_service_shared::test_utils::{
    customer_payload, driver_payload, test_state, unconfigured_state, unreachable_state,
};
use neoride_service_shared::{AppState, MetricsConfig};

fn server(state: AppState) -> TestServer {
    TestServer::new(router(state, &MetricsConfig::default())).unwrap()
}

#[tokio::test]
async fn root_lists_endpoints() {
    let server = server(test_state());

    let response = server.get("/").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["message"], "NeoRide Backend API is running");
    assert_eq!(body["endpoints"]["customers"], "/api/customers");
    assert_eq!(body["endpoints"]["stats"], "/api/stats");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn create_customer_applies_defaults() {
    let server = server(test_state());

    let response = server
        .post("/api/customers")
        .json(&json!({"externalId": "u1", "email": "A@B.com", "fullName": "Jo", "phone": "555"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["email"], "a@b.com");
    assert_eq!(body["totalRides"], 0);
    assert_eq!(body["paymentMethods"], json!([{"kind": "cash", "isDefault": true}]));
    assert_eq!(body["preferences"]["smsAlerts"], true);
    assert!(body["_id"].is_string());
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn create_then_get_returns_same_fields() {
    let server = server(test_state());

    let mut payload = customer_payload("u1", "jo@example.com");
    payload["profileImageUrl"] = json!("https://img.example.com/jo.png");
    let created: Value = server.post("/api/customers").json(&payload).await.json();

    let response = server.get("/api/customers/u1").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let fetched: Value = response.json();
    assert_eq!(fetched, created);
    assert_eq!(fetched["profileImageUrl"], "https://img.example.com/jo.png");
    assert_eq!(fetched["fullName"], "Jo Rider");
}

#[tokio::test]
async fn missing_fields_are_listed_and_nothing_is_stored() {
    let server = server(test_state());

    let response = server
        .post("/api/customers")
        .json(&json!({"externalId": "u1", "email": "a@b.com"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Missing required fields");
    assert_eq!(body["missing"], json!(["fullName", "phone"]));
    let mut received: Vec<&str> = body["received"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    received.sort_unstable();
    assert_eq!(received, ["email", "externalId"]);
    assert_eq!(body["status"], 400);
    assert!(body["instance"].is_string());

    let response = server.get("/api/customers/u1").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_customer_conflicts_on_named_field() {
    let server = server(test_state());

    server
        .post("/api/customers")
        .json(&customer_payload("u1", "a@b.com"))
        .await;

    let response = server
        .post("/api/customers")
        .json(&customer_payload("u2", "A@B.COM"))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "Customer already exists");
    assert_eq!(body["field"], "email");

    let response = server
        .post("/api/customers")
        .json(&customer_payload("u1", "other@b.com"))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["field"], "externalId");
}

#[tokio::test]
async fn create_driver_normalises_and_defaults() {
    let server = server(test_state());

    let response = server
        .post("/api/drivers")
        .json(&driver_payload("d1", "Sam@Drivers.com", "LIC-1", "mh12ab1234"))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["email"], "sam@drivers.com");
    assert_eq!(body["vehiclePlate"], "MH12AB1234");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["isOnline"], false);
    assert_eq!(body["vehicle"]["make"], "Toyota");
    assert_eq!(body["vehicle"]["model"], "Innova Crysta");
    assert_eq!(body["vehicle"]["plateNumber"], "MH12AB1234");
    assert_eq!(body["location"]["type"], "Point");
    assert_eq!(body["location"]["coordinates"], json!([0.0, 0.0]));
    assert_eq!(body["workingHours"]["monday"]["isWorking"], true);
    assert_eq!(body["workingHours"]["sunday"]["isWorking"], false);
}

#[tokio::test]
async fn duplicate_driver_plate_and_license_conflict() {
    let server = server(test_state());

    server
        .post("/api/drivers")
        .json(&driver_payload("d1", "d1@x.com", "LIC-1", "AB12"))
        .await;

    let response = server
        .post("/api/drivers")
        .json(&driver_payload("d2", "d2@x.com", "LIC-2", "ab12"))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["field"], "vehiclePlate");
    assert_eq!(body["error"], "Driver already exists");

    let response = server
        .post("/api/drivers")
        .json(&driver_payload("d3", "d3@x.com", "LIC-1", "CD34"))
        .await;
    assert_eq!(response.json::<Value>()["field"], "licenseNumber");
}

#[tokio::test]
async fn driver_missing_vehicle_fields() {
    let server = server(test_state());

    let response = server
        .post("/api/drivers")
        .json(&json!({"externalId": "d1", "email": "d@x.com", "fullName": "Sam", "phone": "1"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["missing"],
        json!(["licenseNumber", "vehicleModel", "vehiclePlate"])
    );
}

#[tokio::test]
async fn update_merges_fields_and_keeps_identity() {
    let server = server(test_state());
    let created: Value = server
        .post("/api/customers")
        .json(&customer_payload("u1", "a@b.com"))
        .await
        .json();

    let response = server
        .put("/api/customers/u1")
        .json(&json!({"fullName": "Jo Updated", "_id": "forged", "isVerified": true}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["fullName"], "Jo Updated");
    assert_eq!(body["isVerified"], true);
    assert_eq!(body["_id"], created["_id"]);
    assert_eq!(body["createdAt"], created["createdAt"]);
    assert_eq!(body["phone"], "555-0100");
}

#[tokio::test]
async fn update_validation_errors_are_per_field() {
    let server = server(test_state());
    server
        .post("/api/drivers")
        .json(&driver_payload("d1", "d1@x.com", "LIC-1", "AB12"))
        .await;

    let response = server
        .put("/api/drivers/d1")
        .json(&json!({"email": "not-an-email", "rating": 7}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Validation error");
    assert_eq!(body["details"]["email"], "must be a valid email address");
    assert_eq!(body["details"]["rating"], "must be between 0 and 5");
}

#[tokio::test]
async fn operations_on_unknown_identity_are_not_found() {
    let server = server(test_state());

    let response = server.get("/api/drivers/ghost").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "Driver not found");

    let response = server
        .put("/api/customers/ghost")
        .json(&json!({"fullName": "x"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server.delete("/api/customers/ghost").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "Customer not found");
}

#[tokio::test]
async fn delete_confirms_and_removes() {
    let server = server(test_state());
    server
        .post("/api/customers")
        .json(&customer_payload("u1", "a@b.com"))
        .await;

    let response = server.delete("/api/customers/u1").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "Customer deleted successfully"})
    );
    let response = server.get("/api/customers/u1").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_count_customers_and_drivers() {
    let server = server(test_state());
    server
        .post("/api/customers")
        .json(&customer_payload("u1", "a@b.com"))
        .await;
    for n in 1..=3 {
        server
            .post("/api/drivers")
            .json(&driver_payload(
                &format!("d{n}"),
                &format!("d{n}@x.com"),
                &format!("LIC-{n}"),
                &format!("PL{n}"),
            ))
            .await;
    }
    server
        .put("/api/drivers/d2")
        .json(&json!({"status": "approved"}))
        .await;

    let response = server.get("/api/stats").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>(),
        json!({"totalCustomers": 1, "totalDrivers": 3, "approvedDrivers": 1, "pendingDrivers": 2})
    );
}

#[tokio::test]
async fn stats_fail_when_database_is_down() {
    let server = server(unreachable_state());

    let response = server.get("/api/stats").await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>()["type"], "/problems/database-unavailable");
}

#[tokio::test]
async fn health_reports_connected_store() {
    let server = server(test_state());

    let response = server.get("/api/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "API is running");
    assert_eq!(body["connected"], true);
    assert_eq!(body["mongoState"], 1);
    assert_eq!(body["environment"], "development");
}

#[tokio::test]
async fn health_fails_when_database_is_down() {
    let server = server(unreachable_state());

    let response = server.get("/api/health").await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Database connection failed");
    assert_eq!(body["connected"], false);
    assert_eq!(body["mongoState"], 0);
    assert!(body["error"].as_str().unwrap().contains("3 attempts"));
}

#[tokio::test]
async fn missing_connection_string_is_reported_not_crashed() {
    let server = server(unconfigured_state());

    let response = server.get("/api/health").await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.json::<Value>()["error"]
        .as_str()
        .unwrap()
        .contains("MONGODB_URI"));

    let response = server
        .post("/api/customers")
        .json(&customer_payload("u1", "a@b.com"))
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json::<Value>()["type"],
        "/problems/configuration-missing"
    );
}

#[tokio::test]
async fn debug_reports_configuration_without_secrets() {
    let server = server(test_state());

    let response = server.get("/api/debug").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["mongodbUri"], "Not set");
    assert_eq!(body["port"], 3001);
    assert_eq!(body["database"], "NeoRide");
    assert_eq!(body["collections"], json!(["customers", "drivers"]));
    assert!(body.get("collectionsError").is_none());
}

#[tokio::test]
async fn debug_stays_200_when_listing_fails() {
    let server = server(unconfigured_state());

    let response = server.get("/api/debug").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert!(body.get("collections").is_none());
    assert!(body["collectionsError"]
        .as_str()
        .unwrap()
        .contains("MONGODB_URI"));
}

#[tokio::test]
async fn unknown_route_lists_available_routes() {
    let server = server(test_state());

    let response = server.get("/api/rides").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "Route not found");
    assert_eq!(body["requestedPath"], "/api/rides");
    assert_eq!(body["availableRoutes"].as_array().unwrap().len(), 5);
    assert_eq!(body["type"], "/problems/route-not-found");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let server = server(test_state());

    let response = server
        .post("/api/customers")
        .text("{\"externalId\": ")
        .content_type("application/json")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "Invalid JSON payload");
}

#[tokio::test]
async fn non_object_payload_is_bad_request() {
    let server = server(test_state());

    let response = server.post("/api/customers").json(&json!([1, 2])).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["type"], "/problems/invalid-request");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let server = server(test_state());

    let response = server.get("/api/customers/ghost").await;

    let header = response
        .headers()
        .get("x-request-id")
        .expect("request id header")
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(response.json::<Value>()["instance"], header);
}

#[tokio::test]
async fn panics_become_internal_errors() {
    async fn boom() -> &'static str {
        panic!("handler exploded")
    }
    let app = with_middleware(Router::new().route("/boom", get(boom)));
    let server = TestServer::new(app).unwrap();

    let response = server.get("/boom").await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>()["error"], "Internal server error");
}

#[tokio::test]
async fn metrics_endpoint_is_routed() {
    let server = server(test_state());

    let response = server.get("/metrics").await;

    assert_eq!(response.status_code(), StatusCode::OK);
}
