// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// An appointment at or before `now` is past. Both sides are clinic
/// wall-clock time.
pub fn is_past(date: NaiveDate, time: NaiveTime, now: NaiveDateTime) -> bool {
    date.and_time(time) <= now
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Administrators may move freely between visit statuses. `blocked` is
    /// neither a source nor a target here; blocking has its own operation.
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Blocked => vec![],
            current => AppointmentStatus::ALL
                .into_iter()
                .filter(|s| *s != AppointmentStatus::Blocked && *s != current)
                .collect(),
        }
    }

    /// Guard run before every status change, reschedule and delete.
    pub fn ensure_not_past(&self, appointment: &Appointment, now: NaiveDateTime) -> Result<(), AppointmentError> {
        if is_past(appointment.date, appointment.time, now) {
            warn!("Rejected change to past appointment {}", appointment.id);
            return Err(AppointmentError::PastAppointment {
                date: appointment.date,
                time: appointment.time,
            });
        }
        Ok(())
    }

    /// Whether moving into `new_status` reclaims a slot the row had released.
    pub fn reoccupies_slot(&self, current_status: AppointmentStatus, new_status: AppointmentStatus) -> bool {
        !current_status.occupies_slot() && new_status.occupies_slot()
    }
}
