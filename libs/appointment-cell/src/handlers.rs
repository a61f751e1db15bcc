// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    format_slot_time, AppointmentError, AppointmentSearchQuery, AvailableSlotsQuery,
    AvailableSlotsResponse, BlockSlotRequest, BookAppointmentRequest, ConflictCheckQuery,
    RescheduleAppointmentRequest, UpdateNotesRequest, UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

#[derive(Clone)]
pub struct AppointmentState {
    pub booking: Arc<AppointmentBookingService>,
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
            e @ AppointmentError::Conflict { .. } => AppError::Conflict(e.to_string()),
            e @ AppointmentError::PastAppointment { .. } => AppError::BadRequest(e.to_string()),
            e @ AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Store(e) => AppError::ExternalService(e.to_string()),
        }
    }
}

// ==============================================================================
// PUBLIC BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<AppointmentState>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<AvailableSlotsResponse>, AppError> {
    let slots = state.booking.available_slots(query.date).await?;

    Ok(Json(AvailableSlotsResponse {
        date: query.date,
        slots: slots.into_iter().map(format_slot_time).collect(),
    }))
}

#[axum::debug_handler]
pub async fn list_hospitals(State(state): State<AppointmentState>) -> Json<Value> {
    Json(json!({ "hospitals": state.booking.hospitals() }))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let confirmation = state.booking.book_appointment(request).await?;

    Ok((StatusCode::CREATED, Json(json!(confirmation))))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.booking.list_appointments(query).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_stats(State(state): State<AppointmentState>) -> Result<Json<Value>, AppError> {
    let stats = state.booking.stats().await?;

    Ok(Json(json!(stats)))
}

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<AppointmentState>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let response = state.booking.check_conflicts(query).await?;

    Ok(Json(json!(response)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let summary = state.booking.get_appointment(appointment_id).await?;

    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.update_status(appointment_id, request.status).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.reschedule_appointment(appointment_id, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_notes(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateNotesRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.update_notes(appointment_id, request.notes).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.booking.delete_appointment(appointment_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn block_slot(
    State(state): State<AppointmentState>,
    Json(request): Json<BlockSlotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let blocked = state.booking.block_slot(request).await?;

    Ok((StatusCode::CREATED, Json(json!(blocked))))
}

#[axum::debug_handler]
pub async fn unblock_slot(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.booking.unblock_slot(appointment_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<AppointmentState>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let removed = state.booking.delete_patient(patient_id).await?;

    Ok(Json(json!({
        "deleted_patient_id": patient_id,
        "deleted_appointments": removed
    })))
}
