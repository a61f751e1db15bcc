// libs/appointment-cell/src/services/snapshot.rs
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use patient_cell::models::Patient;
use patient_cell::services::PatientStore;
use shared_database::{ChangeFeed, StoreError};

use crate::models::Appointment;
use crate::services::store::AppointmentStore;

/// Everything the engine reads, fetched in one go.
#[derive(Debug, Clone)]
pub struct ClinicSnapshot {
    pub appointments: Vec<Appointment>,
    pub patients: Vec<Patient>,
}

impl ClinicSnapshot {
    pub fn patient(&self, id: uuid::Uuid) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }
}

/// Lazily filled snapshot with a single invalidation signal. A refetch that
/// races an invalidation is served but not cached.
pub struct SnapshotCache {
    appointments: Arc<dyn AppointmentStore>,
    patients: Arc<dyn PatientStore>,
    current: RwLock<Option<Arc<ClinicSnapshot>>>,
    generation: AtomicU64,
}

impl SnapshotCache {
    pub fn new(appointments: Arc<dyn AppointmentStore>, patients: Arc<dyn PatientStore>) -> Self {
        Self {
            appointments,
            patients,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn current(&self) -> Result<Arc<ClinicSnapshot>, StoreError> {
        if let Some(snapshot) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        self.refresh().await
    }

    pub async fn refresh(&self) -> Result<Arc<ClinicSnapshot>, StoreError> {
        let generation = self.generation.load(Ordering::Acquire);
        debug!("Fetching clinic snapshot");

        let (appointments, patients) = tokio::try_join!(
            self.appointments.list_appointments(),
            self.patients.list_patients(),
        )?;

        debug!("Snapshot holds {} appointments and {} patients", appointments.len(), patients.len());
        let snapshot = Arc::new(ClinicSnapshot { appointments, patients });

        let mut slot = self.current.write().await;
        if self.generation.load(Ordering::Acquire) == generation {
            *slot = Some(Arc::clone(&snapshot));
        }
        Ok(snapshot)
    }

    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.current.write().await = None;
    }

    pub async fn is_cached(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Invalidates and refetches on every change signal. A lagged receiver
    /// missed signals, which still only means "refetch".
    pub fn watch(self: Arc<Self>, feed: &ChangeFeed) -> JoinHandle<()> {
        let mut changes = feed.subscribe();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(()) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Snapshot watcher lagged by {} change signals", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("Change feed closed, snapshot watcher stopping");
                        break;
                    }
                }

                self.invalidate().await;
                if let Err(e) = self.refresh().await {
                    error!("Failed to refetch clinic snapshot: {}", e);
                }
            }
        })
    }
}
