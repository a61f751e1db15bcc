use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use appointment_cell::services::AppointmentBookingService;
use patient_cell::router::patient_routes;
use patient_cell::services::PatientService;
use shared_config::AppConfig;

pub fn create_router(
    config: Arc<AppConfig>,
    booking: Arc<AppointmentBookingService>,
    patients: Arc<PatientService>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/appointments", appointment_routes(Arc::clone(&config), booking))
        .nest("/patients", patient_routes(config, patients))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    use appointment_cell::services::{MemoryAppointmentStore, SnapshotCache};
    use patient_cell::services::MemoryPatientStore;

    fn app() -> Router {
        let config = Arc::new(AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: "secret".to_string(),
            clinic_tenant: "default".to_string(),
            clinic_utc_offset: shared_config::default_utc_offset(),
            clinic_hospitals: vec![],
            port: 0,
            realtime_enabled: false,
        });
        let store = Arc::new(MemoryAppointmentStore::new());
        let patient_store = Arc::new(MemoryPatientStore::new());
        let patients = Arc::new(PatientService::new(patient_store.clone()));
        let snapshot = Arc::new(SnapshotCache::new(store.clone(), patient_store));
        let booking = Arc::new(AppointmentBookingService::from_config(&config, store, Arc::clone(&patients), snapshot));

        create_router(config, booking, patients)
    }

    #[tokio::test]
    async fn test_cells_are_mounted() {
        let root = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(root.status(), StatusCode::OK);

        let hospitals = app()
            .oneshot(Request::builder().uri("/appointments/hospitals").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(hospitals.status(), StatusCode::OK);

        let patients = app()
            .oneshot(Request::builder().uri("/patients").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(patients.status(), StatusCode::UNAUTHORIZED);
    }
}
