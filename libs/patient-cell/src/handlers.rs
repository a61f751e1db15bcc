use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{PatientError, PatientSearchQuery, UpdatePatientNotesRequest, UpdatePatientRequest};
use crate::services::PatientService;

#[derive(Clone)]
pub struct PatientState {
    pub patients: Arc<PatientService>,
}

impl From<PatientError> for AppError {
    fn from(error: PatientError) -> Self {
        match error {
            PatientError::NotFound => AppError::NotFound("Patient not found".to_string()),
            PatientError::ValidationError(msg) => AppError::ValidationError(msg),
            PatientError::Store(e) => AppError::ExternalService(e.to_string()),
        }
    }
}

#[axum::debug_handler]
pub async fn search_patients(
    State(state): State<PatientState>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let patients = state.patients.search_patients(query).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<PatientState>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let patient = state.patients.get_patient(patient_id).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<PatientState>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let patient = state.patients.update_patient(patient_id, request).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient_notes(
    State(state): State<PatientState>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdatePatientNotesRequest>,
) -> Result<Json<Value>, AppError> {
    let patient = state.patients.update_notes(patient_id, request.notes).await?;

    Ok(Json(json!(patient)))
}
