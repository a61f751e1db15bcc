use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};

use patient_cell::models::{NewPatient, PatientChanges};
use patient_cell::services::{PatientStore, SupabasePatientStore};
use shared_database::{StoreError, SupabaseClient};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn store_for(mock_server: &MockServer) -> SupabasePatientStore {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    SupabasePatientStore::new(Arc::new(SupabaseClient::new(&config)), &config)
}

#[tokio::test]
async fn test_find_by_email_is_tenant_scoped() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("tenant_id", "eq.test-clinic"))
        .and(query_param("email", "eq.ana@mail.com"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_row(&patient_id, "test-clinic", "Ana", "111", Some("ana@mail.com"))
        ])))
        .mount(&mock_server)
        .await;

    let found = store_for(&mock_server).find_by_email("ana@mail.com").await.unwrap();

    assert_eq!(found.map(|p| p.id.to_string()), Some(patient_id));
}

#[tokio::test]
async fn test_find_by_name_and_phone_returns_none_on_empty_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("name", "eq.Ana Souza"))
        .and(query_param("phone", "eq.111"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let found = store_for(&mock_server).find_by_name_and_phone("Ana Souza", "111").await.unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn test_insert_stamps_tenant_and_asks_for_representation() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({ "tenant_id": "test-clinic", "name": "Bia", "phone": "222" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_row(&patient_id, "test-clinic", "Bia", "222", None)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created = store_for(&mock_server)
        .insert_patient(NewPatient {
            name: "Bia".to_string(),
            email: None,
            phone: "222".to_string(),
            notes: None,
            medical_history: None,
        })
        .await
        .unwrap();

    assert_eq!(created.id.to_string(), patient_id);
}

#[tokio::test]
async fn test_update_of_missing_row_is_not_found() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = store_for(&mock_server)
        .update_patient(patient_id, PatientChanges { notes: Some("x".to_string()), ..PatientChanges::default() })
        .await;

    assert_matches!(result, Err(StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_store_failure_is_propagated() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(503).set_body_json(
            MockSupabaseResponses::error_response("upstream unavailable", "PGRST000")
        ))
        .mount(&mock_server)
        .await;

    let result = store_for(&mock_server).list_patients().await;

    assert_matches!(result, Err(StoreError::Api { status: 503, .. }));
}

#[tokio::test]
async fn test_list_patients_walks_every_page() {
    let mock_server = MockServer::start().await;
    let first_page: Vec<_> = (0..1000)
        .map(|i| MockSupabaseResponses::patient_row(&Uuid::new_v4().to_string(), "test-clinic", &format!("Paciente {:04}", i), "111", None))
        .collect();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("order", "name.asc,id.asc"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(first_page)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("offset", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_row(&Uuid::new_v4().to_string(), "test-clinic", "Zuleica", "999", None)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let patients = store_for(&mock_server).list_patients().await.unwrap();

    assert_eq!(patients.len(), 1001);
    assert_eq!(patients[1000].name, "Zuleica");
}
