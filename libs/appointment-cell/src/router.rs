// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::{admin_middleware, auth_middleware};

use crate::handlers::{self, AppointmentState};
use crate::services::booking::AppointmentBookingService;

pub fn appointment_routes(config: Arc<AppConfig>, booking: Arc<AppointmentBookingService>) -> Router {
    // Booking wizard, no account needed
    let public_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/slots", get(handlers::get_available_slots))
        .route("/hospitals", get(handlers::list_hospitals));

    let admin_routes = Router::new()
        .route("/", get(handlers::list_appointments))
        .route("/stats", get(handlers::get_appointment_stats))
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .route("/blocks", post(handlers::block_slot))
        .route("/blocks/{appointment_id}", delete(handlers::unblock_slot))
        .route("/patients/{patient_id}", delete(handlers::delete_patient))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/notes", patch(handlers::update_appointment_notes))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/admin", admin_routes)
        .with_state(AppointmentState { booking })
}
