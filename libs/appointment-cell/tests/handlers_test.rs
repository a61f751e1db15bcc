use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::router::appointment_routes;
use appointment_cell::services::{AppointmentBookingService, FixedClock, MemoryAppointmentStore, SnapshotCache};
use patient_cell::services::{MemoryPatientStore, PatientService};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    router: Router,
    admin_token: String,
    patient_token: String,
}

fn test_app() -> TestApp {
    let config = TestConfig::default();
    let store = Arc::new(MemoryAppointmentStore::new());
    let patient_store = Arc::new(MemoryPatientStore::new());
    let patients = Arc::new(PatientService::new(patient_store.clone()));
    let snapshot = Arc::new(SnapshotCache::new(store.clone(), patient_store));
    let now = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap().and_hms_opt(8, 0, 0).unwrap();

    let booking = Arc::new(AppointmentBookingService::new(
        store,
        patients,
        snapshot,
        Arc::new(FixedClock(now)),
        config.hospitals.clone(),
    ));

    TestApp {
        router: appointment_routes(config.to_arc(), booking),
        admin_token: JwtTestUtils::create_supabase_token(&TestUser::admin("admin@clinic.test"), &config.jwt_secret),
        patient_token: JwtTestUtils::create_test_token(&TestUser::patient("p@clinic.test"), &config.jwt_secret, None),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn booking_body(name: &str, phone: &str, time: &str) -> Body {
    Body::from(
        json!({
            "name": name,
            "phone": phone,
            "hospital_id": "centro",
            "date": "2024-06-10",
            "time": time,
            "reason": "first-visit"
        })
        .to_string(),
    )
}

fn post_booking(body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("Content-Type", "application/json")
        .body(body)
        .unwrap()
}

fn admin_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token));

    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_public_slots_for_empty_day() {
    let app = test_app();

    let response = app.router
        .oneshot(Request::builder().uri("/slots?date=2024-06-10").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 24);
    assert_eq!(slots[0], "09:00");
    assert_eq!(slots[23], "20:30");
}

#[tokio::test]
async fn test_public_hospitals_list() {
    let app = test_app();

    let response = app.router
        .oneshot(Request::builder().uri("/hospitals").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["hospitals"], json!(["centro", "norte"]));
}

#[tokio::test]
async fn test_booking_then_double_booking_is_409() {
    let app = test_app();

    let response = app.router.clone()
        .oneshot(post_booking(booking_body("Ana", "111", "09:00")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["appointment"]["time"], "09:00");
    assert_eq!(body["appointment"]["status"], "confirmed");
    assert_eq!(body["patient"]["name"], "Ana");

    let response = app.router
        .oneshot(post_booking(booking_body("Bia", "222", "09:00")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("just taken"));
}

#[tokio::test]
async fn test_booking_without_phone_is_422() {
    let app = test_app();
    let body = Body::from(
        json!({ "name": "Ana", "hospital_id": "centro", "date": "2024-06-10", "time": "09:00", "reason": "follow-up" })
            .to_string(),
    );

    let response = app.router.oneshot(post_booking(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_routes_need_admin_role() {
    let app = test_app();

    let anonymous = app.router.clone()
        .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let patient = app.router
        .oneshot(admin_request("GET", "/admin", &app.patient_token, None))
        .await
        .unwrap();
    assert_eq!(patient.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_lists_and_updates_status() {
    let app = test_app();
    let booked = body_json(
        app.router.clone().oneshot(post_booking(booking_body("Ana", "111", "10:00"))).await.unwrap(),
    )
    .await;
    let id = booked["appointment"]["id"].as_str().unwrap().to_string();

    let listed = app.router.clone()
        .oneshot(admin_request("GET", "/admin?date=2024-06-10", &app.admin_token, None))
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::OK);
    let listed = body_json(listed).await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["appointments"][0]["patient_name"], "Ana");
    assert_eq!(listed["appointments"][0]["is_past"], false);

    let updated = app.router
        .oneshot(admin_request(
            "PATCH",
            &format!("/admin/{}/status", id),
            &app.admin_token,
            Some(json!({ "status": "waiting_room" })),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(body_json(updated).await["status"], "waiting_room");
}

#[tokio::test]
async fn test_admin_block_removes_public_slot_and_conflict_check_reports_it() {
    let app = test_app();

    let blocked = app.router.clone()
        .oneshot(admin_request(
            "POST",
            "/admin/blocks",
            &app.admin_token,
            Some(json!({ "hospital_id": "centro", "date": "2024-06-11", "time": "09:00" })),
        ))
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::CREATED);
    assert_eq!(body_json(blocked).await["status"], "blocked");

    let slots = body_json(
        app.router.clone()
            .oneshot(Request::builder().uri("/slots?date=2024-06-11").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;
    assert!(!slots["slots"].as_array().unwrap().contains(&json!("09:00")));

    let check = app.router
        .oneshot(admin_request(
            "GET",
            "/admin/conflicts/check?date=2024-06-11&time=09:00",
            &app.admin_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(check.status(), StatusCode::OK);
    assert_eq!(body_json(check).await["has_conflict"], true);
}

#[tokio::test]
async fn test_unknown_appointment_is_404() {
    let app = test_app();

    let response = app.router
        .oneshot(admin_request("GET", &format!("/admin/{}", uuid::Uuid::new_v4()), &app.admin_token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
