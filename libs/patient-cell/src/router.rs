use std::sync::Arc;
use axum::{middleware, routing::{get, patch}, Router};

use shared_config::AppConfig;
use shared_utils::extractor::{admin_middleware, auth_middleware};

use crate::handlers::*;
use crate::services::PatientService;

pub fn patient_routes(config: Arc<AppConfig>, patients: Arc<PatientService>) -> Router {
    // Patient records are only reachable from the admin dashboard
    Router::new()
        .route("/", get(search_patients))
        .route("/{patient_id}", get(get_patient).put(update_patient))
        .route("/{patient_id}/notes", patch(update_patient_notes))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(PatientState { patients })
}
