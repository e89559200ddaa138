use clinic_mesh::remote::{Outcome, RemoteCollections, StubRemote};
use clinic_mesh::store::MemoryStore;
use clinic_mesh::build_app;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

// Test client wrapper for making API calls against an in-process server
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    async fn spawn(remote: Arc<StubRemote>) -> Self {
        let remote: Arc<dyn RemoteCollections> = remote;
        let app = build_app(Arc::new(MemoryStore::new()), remote, 4);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            client: Client::new(),
            base_url: format!("http://{}", address),
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
            .unwrap()
    }

    async fn patch(&self, path: &str, json: Value) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }
}

fn directory() -> StubRemote {
    StubRemote::new()
        .with_snapshot(
            "users",
            "D1",
            json!({"id": "D1", "first_name": "Dana", "role": "doctor", "password": "hash"}),
        )
        .with_snapshot(
            "users",
            "P1",
            json!({"id": "P1", "first_name": "Pat", "role": "patient"}),
        )
        .with_snapshot(
            "users",
            "PH1",
            json!({"id": "PH1", "first_name": "Phil", "email": "phil@example.com", "last_login": "2025-01-01T00:00:00Z"}),
        )
}

fn slot(patient: &str, start: &str, end: &str) -> Value {
    json!({
        "patient_user_id": patient,
        "doctor_user_id": "D1",
        "start_time": start,
        "end_time": end,
    })
}

#[tokio::test]
async fn appointment_booking_workflow() {
    let api = TestClient::spawn(Arc::new(directory())).await;

    // Book 09:00-10:00
    let response = api
        .post("/appointments", slot("P1", "2025-03-01T09:00:00Z", "2025-03-01T10:00:00Z"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let booked: Value = response.json().await.unwrap();
    assert_eq!(booked["status"], "booked");
    let booked_id = booked["id"].as_str().unwrap().to_string();

    // Overlapping request is refused
    let response = api
        .post("/appointments", slot("P9", "2025-03-01T09:30:00Z", "2025-03-01T10:30:00Z"))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Doctor is not available during this time slot.");

    // Touching intervals do not overlap
    let response = api
        .post("/appointments", slot("P9", "2025-03-01T10:00:00Z", "2025-03-01T11:00:00Z"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Listing nests the doctor and patient snapshots, or annotates what is missing
    let response = api.get("/appointments?doctor_user_id=D1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let views: Value = response.json().await.unwrap();
    let views = views.as_array().unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0]["id"], booked_id.as_str());
    assert_eq!(views[0]["doctor"]["first_name"], "Dana");
    assert!(views[0]["doctor"].get("password").is_none());
    assert_eq!(views[0]["patient"]["first_name"], "Pat");
    assert!(views[1].get("patient").is_none());
    assert!(views[1]["_patient_error"].is_string());

    // Cancelling frees the slot
    let response = api
        .patch(&format!("/appointments/{}", booked_id), json!({"status": "cancelled"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled: Value = response.json().await.unwrap();
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["doctor"]["first_name"], "Dana");

    let response = api
        .post("/appointments", slot("P1", "2025-03-01T09:15:00Z", "2025-03-01T09:45:00Z"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Cancelled is terminal
    let response = api
        .patch(&format!("/appointments/{}", booked_id), json!({"status": "booked"}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = api.delete(&format!("/appointments/{}", booked_id)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = api.get(&format!("/appointments/{}", booked_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn request_errors_render_as_json() {
    let api = TestClient::spawn(Arc::new(StubRemote::new())).await;

    let response = api.delete("/appointments").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Method not allowed");

    let response = api.get("/no-such-collection").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    // Inverted interval
    let response = api
        .post("/appointments", slot("P1", "2025-03-01T10:00:00Z", "2025-03-01T09:00:00Z"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Naive timestamp
    let response = api
        .post("/appointments", slot("P1", "2025-03-01T09:00:00", "2025-03-01T10:00:00Z"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    // Missing required fields
    let response = api.post("/prescriptions", json!({"patient_user_id": "P1"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Empty update body
    let response = api
        .post("/appointments", slot("P1", "2025-03-01T09:00:00Z", "2025-03-01T10:00:00Z"))
        .await;
    let created: Value = response.json().await.unwrap();
    let response = api
        .patch(&format!("/appointments/{}", created["id"].as_str().unwrap()), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No updatable fields provided");
}

#[tokio::test]
async fn pharmacist_profiles_flatten_identity_and_keep_licenses_unique() {
    let api = TestClient::spawn(Arc::new(directory())).await;

    let response = api
        .post(
            "/pharmacists",
            json!({"user_id": "PH1", "pharmacy_name": "Corner Pharmacy", "pharmacy_license_number": "LIC-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = api
        .post(
            "/pharmacists",
            json!({"user_id": "PH2", "pharmacy_name": "Other", "pharmacy_license_number": "LIC-1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = api.get("/pharmacists/PH1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: Value = response.json().await.unwrap();
    assert_eq!(view["user_id"], "PH1");
    assert_eq!(view["pharmacy_name"], "Corner Pharmacy");
    assert_eq!(view["email"], "phil@example.com");
    assert!(view.get("last_login").is_none());
    assert!(view.get("_user_error").is_none());
}

#[tokio::test]
async fn fulfillment_is_delegated_to_the_prescription_owner() {
    let remote = Arc::new(
        directory()
            .with_mutation(
                "prescriptions",
                "rx-1",
                Outcome::Found(json!({"id": "rx-1", "status": "filled"})),
            )
            .with_mutation(
                "prescriptions",
                "rx-2",
                Outcome::RemoteError {
                    status: 409,
                    body: "Prescription already filled".to_string(),
                },
            ),
    );
    let api = TestClient::spawn(Arc::clone(&remote)).await;

    let response = api
        .post("/fulfillments", json!({"prescription_id": "rx-1", "pharmacist_user_id": "PH1"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "filled");

    let patches = remote.patches();
    assert_eq!(patches.len(), 1);
    let (collection, id, payload) = &patches[0];
    assert_eq!(collection, "prescriptions");
    assert_eq!(id, "rx-1");
    assert_eq!(payload["status"], "filled");
    assert_eq!(payload["fulfilled_by_pharmacist_user_id"], "PH1");
    assert!(payload["fulfilled_date"].is_string());

    let response = api
        .post("/fulfillments", json!({"prescription_id": "rx-2", "pharmacist_user_id": "PH1"}))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = api
        .post("/fulfillments", json!({"prescription_id": "rx-unknown", "pharmacist_user_id": "PH1"}))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api.post("/fulfillments", json!({"pharmacist_user_id": "PH1"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lab_results_nest_their_order_and_history_collects_everything() {
    let api = TestClient::spawn(Arc::new(directory())).await;

    let response = api
        .post(
            "/lab-orders",
            json!({"patient_user_id": "P1", "doctor_user_id": "D1", "test_type": "CBC"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order: Value = response.json().await.unwrap();
    let order_id = order["id"].as_str().unwrap();

    let response = api
        .post(
            "/lab-results",
            json!({"lab_order_id": order_id, "lab_technician_user_id": "T1", "result_data": {"wbc": 6.1}}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let result: Value = response.json().await.unwrap();

    let response = api
        .get(&format!("/lab-results/{}", result["id"].as_str().unwrap()))
        .await;
    let view: Value = response.json().await.unwrap();
    assert_eq!(view["order"]["id"], order_id);
    assert!(view["order"].get("created_at").is_none());
    assert!(view["_lab_technician_error"].is_string());

    let response = api.get("/patients/P1/history").await;
    assert_eq!(response.status(), StatusCode::OK);
    let history: Value = response.json().await.unwrap();
    assert_eq!(history["patient_user_id"], "P1");
    assert_eq!(history["patient_user"]["first_name"], "Pat");
    assert_eq!(history["lab_orders"].as_array().unwrap().len(), 1);
    assert_eq!(history["lab_results"][0]["result_data"]["wbc"], 6.1);
    assert_eq!(history["prescriptions"], json!([]));
    assert!(history["_patient_profile_error"].is_string());
}
