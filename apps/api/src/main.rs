use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::{
    AppointmentBookingService, AppointmentStore, MemoryAppointmentStore, SnapshotCache,
    SupabaseAppointmentStore,
};
use patient_cell::services::{MemoryPatientStore, PatientService, PatientStore, SupabasePatientStore};
use shared_config::AppConfig;
use shared_database::{ChangeFeed, RealtimeListener, SupabaseClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API server");

    let config = Arc::new(AppConfig::from_env());
    let feed = ChangeFeed::new();

    let (appointment_store, patient_store) = build_stores(&config, &feed);
    let snapshot = Arc::new(SnapshotCache::new(Arc::clone(&appointment_store), Arc::clone(&patient_store)));
    let patients = Arc::new(PatientService::new(patient_store));
    let booking = Arc::new(AppointmentBookingService::from_config(
        &config,
        appointment_store,
        Arc::clone(&patients),
        Arc::clone(&snapshot),
    ));

    // Keep the snapshot in step with remote writers
    let _watcher = Arc::clone(&snapshot).watch(&feed);
    if config.is_configured() && config.realtime_enabled {
        match RealtimeListener::new(&config, feed.clone()) {
            Some(listener) => {
                listener.spawn();
            }
            None => warn!("SUPABASE_URL is not a valid realtime endpoint; push updates disabled"),
        }
    }

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(Arc::clone(&config), booking, patients)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn build_stores(
    config: &AppConfig,
    feed: &ChangeFeed,
) -> (Arc<dyn AppointmentStore>, Arc<dyn PatientStore>) {
    if config.is_configured() {
        let supabase = Arc::new(SupabaseClient::new(config));
        info!("Using Supabase store for tenant {}", config.clinic_tenant);
        (
            Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase), config)),
            Arc::new(SupabasePatientStore::new(supabase, config)),
        )
    } else {
        warn!("Supabase is not configured; running on in-memory stores");
        (
            Arc::new(MemoryAppointmentStore::with_feed(feed.clone())),
            Arc::new(MemoryPatientStore::with_feed(feed.clone())),
        )
    }
}
