// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, ConflictCheckResponse};
use crate::services::store::AppointmentStore;

/// Live appointment holding `(date, time)`, other than `exclude`.
pub fn find_conflict<'a>(
    appointments: &'a [Appointment],
    date: NaiveDate,
    time: NaiveTime,
    exclude_appointment_id: Option<Uuid>,
) -> Option<&'a Appointment> {
    appointments.iter().find(|a| {
        Some(a.id) != exclude_appointment_id && a.occupies_slot() && a.is_at(date, time)
    })
}

pub fn validate_no_conflict(
    appointments: &[Appointment],
    date: NaiveDate,
    time: NaiveTime,
    exclude_appointment_id: Option<Uuid>,
) -> Result<(), AppointmentError> {
    match find_conflict(appointments, date, time, exclude_appointment_id) {
        Some(existing) => {
            debug!("Slot {} {} held by appointment {}", date, time, existing.id);
            Err(AppointmentError::Conflict { date, time })
        }
        None => Ok(()),
    }
}

/// Store-backed half of conflict detection: the snapshot is only a fast
/// path, this re-query runs right before every slot-claiming write.
pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    pub async fn check_conflicts(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let holders = self.store.appointments_at(date, time).await?;
        let conflicting = find_conflict(&holders, date, time, exclude_appointment_id).cloned();

        if let Some(existing) = &conflicting {
            warn!("Conflict detected at {} {}: appointment {}", date, time.format("%H:%M"), existing.id);
        }

        Ok(ConflictCheckResponse {
            has_conflict: conflicting.is_some(),
            conflicting_appointment: conflicting,
        })
    }

    pub async fn ensure_slot_free(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        if self.check_conflicts(date, time, exclude_appointment_id).await?.has_conflict {
            return Err(AppointmentError::Conflict { date, time });
        }
        Ok(())
    }
}
