use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use patient_cell::models::ContactDetails;
use patient_cell::router::patient_routes;
use patient_cell::services::{MemoryPatientStore, PatientService};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    router: Router,
    patients: Arc<PatientService>,
    admin_token: String,
    patient_token: String,
}

fn test_app() -> TestApp {
    let config = TestConfig::default();
    let patients = Arc::new(PatientService::new(Arc::new(MemoryPatientStore::new())));

    TestApp {
        router: patient_routes(config.to_arc(), Arc::clone(&patients)),
        patients,
        admin_token: JwtTestUtils::create_test_token(&TestUser::admin("admin@clinic.test"), &config.jwt_secret, None),
        patient_token: JwtTestUtils::create_test_token(&TestUser::patient("p@clinic.test"), &config.jwt_secret, None),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_admin_lists_patients() {
    let app = test_app();
    app.patients.create_patient(ContactDetails::new("Ana", None, "111")).await.unwrap();

    let response = app.router
        .oneshot(
            Request::builder()
                .uri("/?name=an")
                .header("Authorization", format!("Bearer {}", app.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["patients"][0]["name"], "Ana");
}

#[tokio::test]
async fn test_non_admin_cannot_read_patients() {
    let app = test_app();

    let response = app.router
        .oneshot(
            Request::builder()
                .uri("/")
                .header("Authorization", format!("Bearer {}", app.patient_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_updates_clinical_notes() {
    let app = test_app();
    let patient = app.patients.create_patient(ContactDetails::new("Ana", None, "111")).await.unwrap();

    let response = app.router
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/{}/notes", patient.id))
                .header("Authorization", format!("Bearer {}", app.admin_token))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "notes": "Alergia a penicilina" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["notes"], "Alergia a penicilina");
}

#[tokio::test]
async fn test_unknown_patient_is_404() {
    let app = test_app();

    let response = app.router
        .oneshot(
            Request::builder()
                .uri(format!("/{}", uuid::Uuid::new_v4()))
                .header("Authorization", format!("Bearer {}", app.admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
