// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use patient_cell::models::{BookingIdentity, ContactDetails};
use patient_cell::services::PatientService;
use shared_config::AppConfig;
use shared_database::StoreError;

use crate::models::{
    format_slot_time, parse_slot_time, Appointment, AppointmentChanges, AppointmentError,
    AppointmentSearchQuery, AppointmentStats, AppointmentStatus, AppointmentSummary,
    BlockSlotRequest, BookAppointmentRequest, BookingConfirmation, ConflictCheckQuery,
    ConflictCheckResponse, NewAppointment, RescheduleAppointmentRequest, ValidatedBooking,
    VisitReason,
};
use crate::services::availability::OpeningHours;
use crate::services::clock::{ClinicClock, Clock};
use crate::services::conflict::{validate_no_conflict, ConflictDetectionService};
use crate::services::lifecycle::{is_past, AppointmentLifecycleService};
use crate::services::snapshot::{ClinicSnapshot, SnapshotCache};
use crate::services::store::AppointmentStore;

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    patients: Arc<PatientService>,
    snapshot: Arc<SnapshotCache>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    opening_hours: OpeningHours,
    clock: Arc<dyn Clock>,
    hospitals: Vec<String>,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        patients: Arc<PatientService>,
        snapshot: Arc<SnapshotCache>,
        clock: Arc<dyn Clock>,
        hospitals: Vec<String>,
    ) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            opening_hours: OpeningHours::default(),
            store,
            patients,
            snapshot,
            clock,
            hospitals,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn AppointmentStore>,
        patients: Arc<PatientService>,
        snapshot: Arc<SnapshotCache>,
    ) -> Self {
        Self::new(
            store,
            patients,
            snapshot,
            Arc::new(ClinicClock::new(config.clinic_utc_offset)),
            config.clinic_hospitals.clone(),
        )
    }

    pub fn hospitals(&self) -> &[String] {
        &self.hospitals
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // ==============================================================================
    // BOOKING FLOW
    // ==============================================================================

    pub async fn available_slots(&self, date: NaiveDate) -> Result<Vec<NaiveTime>, AppointmentError> {
        let snapshot = self.snapshot.current().await?;
        Ok(self.opening_hours.available_slots(date, &snapshot.appointments, self.now()))
    }

    pub fn validate_booking(&self, request: BookAppointmentRequest) -> Result<ValidatedBooking, AppointmentError> {
        let name = required(request.name, "name")?;
        let phone = required(request.phone, "phone")?;
        let hospital_id = self.check_hospital(request.hospital_id.as_deref().unwrap_or_default())?;
        let date = request
            .date
            .ok_or_else(|| AppointmentError::ValidationError("Appointment date is required".to_string()))?;
        let time = self.check_slot_time(&required(request.time, "time")?)?;
        let reason = request
            .reason
            .ok_or_else(|| AppointmentError::ValidationError("Visit reason is required".to_string()))?;

        let service_name = request.service_name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        if reason == VisitReason::SpecificService && service_name.is_none() {
            return Err(AppointmentError::ValidationError(
                "Service description is required for specific-service visits".to_string(),
            ));
        }

        let contact = ContactDetails::new(&name, request.email.as_deref(), &phone);
        if contact.is_system() {
            return Err(AppointmentError::ValidationError(
                "This name and phone pair is reserved for blocked slots".to_string(),
            ));
        }

        Ok(ValidatedBooking {
            contact,
            hospital_id,
            date,
            time,
            reason,
            service_name,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
        })
    }

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<BookingConfirmation, AppointmentError> {
        let booking = self.validate_booking(request)?;
        self.ensure_future_candidate(booking.date, booking.time)?;

        // The slot is secured before any patient row is touched.
        if let Err(e) = self.ensure_free(booking.date, booking.time, None).await {
            warn!("Booking rejected: {} {} is taken", booking.date, format_slot_time(booking.time));
            return Err(e);
        }

        let identity = self.patients.identify_for_booking(booking.contact).await?;
        let (patient, refresh, created) = match identity {
            BookingIdentity::Existing { patient, refresh } => (patient, refresh, false),
            BookingIdentity::New(contact) => (self.patients.create_patient(contact).await?, None, true),
        };

        let inserted = self
            .store
            .insert_appointment(NewAppointment {
                hospital_id: booking.hospital_id,
                patient_id: patient.id,
                date: booking.date,
                time: booking.time,
                status: AppointmentStatus::Confirmed,
                reason: Some(booking.reason),
                service_name: booking.service_name,
                notes: booking.notes,
            })
            .await;

        let appointment = match inserted {
            Ok(appointment) => appointment,
            Err(e) => {
                if created {
                    self.discard_patient(patient.id).await;
                }
                return Err(slot_write_error(e, booking.date, booking.time));
            }
        };

        let patient = match refresh {
            Some(contact) => match self.patients.refresh_contact(patient.id, &contact).await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    warn!("Appointment {} stored but contact refresh for {} failed: {}", appointment.id, patient.id, e);
                    patient
                }
            },
            None => patient,
        };

        self.snapshot.invalidate().await;
        info!(
            "Booked appointment {} for patient {} at {} {}",
            appointment.id, patient.id, appointment.date, format_slot_time(appointment.time)
        );

        Ok(BookingConfirmation { appointment, patient })
    }

    // ==============================================================================
    // ADMIN MUTATIONS
    // ==============================================================================

    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch(appointment_id).await?;
        if appointment.is_blocked() {
            return Err(AppointmentError::ValidationError(
                "Blocked slots cannot be rescheduled; unblock and block the new slot instead".to_string(),
            ));
        }
        let now = self.now();
        self.lifecycle_service.ensure_not_past(&appointment, now)?;

        let time = self.check_slot_time(&request.time)?;
        let date = request.date;
        if appointment.is_at(date, time) {
            debug!("Reschedule of {} keeps its own slot", appointment_id);
            return Ok(appointment);
        }
        self.ensure_future_candidate(date, time)?;

        if appointment.occupies_slot() {
            self.ensure_free(date, time, Some(appointment_id)).await?;
        }

        let changes = AppointmentChanges {
            slot: Some((date, time)),
            ..AppointmentChanges::default()
        };
        let updated = self
            .store
            .update_appointment(appointment_id, changes)
            .await
            .map_err(|e| slot_write_error(e, date, time))?;

        self.snapshot.invalidate().await;
        info!(
            "Rescheduled appointment {} from {} {} to {} {}",
            appointment_id,
            appointment.date,
            format_slot_time(appointment.time),
            date,
            format_slot_time(time)
        );
        Ok(updated)
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch(appointment_id).await?;
        self.lifecycle_service.ensure_not_past(&appointment, self.now())?;

        if appointment.status == new_status && !appointment.is_blocked() {
            return Ok(appointment);
        }
        self.lifecycle_service.validate_status_transition(appointment.status, new_status)?;

        if self.lifecycle_service.reoccupies_slot(appointment.status, new_status) {
            self.ensure_free(appointment.date, appointment.time, Some(appointment_id)).await?;
        }

        let changes = AppointmentChanges {
            status: Some(new_status),
            ..AppointmentChanges::default()
        };
        let updated = self
            .store
            .update_appointment(appointment_id, changes)
            .await
            .map_err(|e| slot_write_error(e, appointment.date, appointment.time))?;

        self.snapshot.invalidate().await;
        info!("Appointment {} moved from {} to {}", appointment_id, appointment.status, new_status);
        Ok(updated)
    }

    /// Notes stay editable after the visit.
    pub async fn update_notes(&self, appointment_id: Uuid, notes: String) -> Result<Appointment, AppointmentError> {
        self.fetch(appointment_id).await?;

        let changes = AppointmentChanges {
            notes: Some(notes),
            ..AppointmentChanges::default()
        };
        let updated = self.store.update_appointment(appointment_id, changes).await?;

        self.snapshot.invalidate().await;
        Ok(updated)
    }

    pub async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let appointment = self.fetch(appointment_id).await?;
        self.lifecycle_service.ensure_not_past(&appointment, self.now())?;

        self.store.delete_appointment(appointment_id).await?;
        self.snapshot.invalidate().await;
        info!("Deleted appointment {}", appointment_id);
        Ok(())
    }

    /// Removes a slot from availability with a `blocked` row owned by the
    /// system patient.
    pub async fn block_slot(&self, request: BlockSlotRequest) -> Result<Appointment, AppointmentError> {
        let hospital_id = self.check_hospital(&request.hospital_id)?;
        let time = self.check_slot_time(&request.time)?;
        let date = request.date;
        self.ensure_future_candidate(date, time)?;

        self.ensure_free(date, time, None).await?;
        let system = self.patients.ensure_system_patient().await?;

        let blocked = self
            .store
            .insert_appointment(NewAppointment {
                hospital_id,
                patient_id: system.id,
                date,
                time,
                status: AppointmentStatus::Blocked,
                reason: None,
                service_name: None,
                notes: request.notes,
            })
            .await
            .map_err(|e| slot_write_error(e, date, time))?;

        self.snapshot.invalidate().await;
        info!("Blocked slot {} {}", date, format_slot_time(time));
        Ok(blocked)
    }

    pub async fn unblock_slot(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let appointment = self.fetch(appointment_id).await?;
        if !appointment.is_blocked() {
            return Err(AppointmentError::ValidationError(format!(
                "Appointment {} is not a blocked slot",
                appointment_id
            )));
        }
        self.delete_appointment(appointment_id).await
    }

    /// Deletes the patient together with every appointment they own, past
    /// ones included. Returns the number of appointments removed.
    pub async fn delete_patient(&self, patient_id: Uuid) -> Result<usize, AppointmentError> {
        self.patients.get_patient(patient_id).await?;
        let owned = self.store.count_patient_appointments(patient_id).await?;

        // The patient row goes first: the foreign key cascades in the
        // database, and nothing is lost if this write fails.
        self.patients.delete_patient(patient_id).await?;
        let swept = self.store.delete_patient_appointments(patient_id).await?;

        self.snapshot.invalidate().await;
        let removed = owned.max(swept);
        info!("Deleted patient {} and {} appointments", patient_id, removed);
        Ok(removed)
    }

    // ==============================================================================
    // DASHBOARD READS
    // ==============================================================================

    pub async fn list_appointments(
        &self,
        query: AppointmentSearchQuery,
    ) -> Result<Vec<AppointmentSummary>, AppointmentError> {
        let snapshot = self.snapshot.current().await?;
        let now = self.now();

        let mut summaries: Vec<AppointmentSummary> = snapshot
            .appointments
            .iter()
            .filter(|a| query.matches(a))
            .map(|a| summarize(&snapshot, a.clone(), now))
            .collect();
        summaries.sort_by_key(|s| s.appointment.civil_instant());

        Ok(summaries)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<AppointmentSummary, AppointmentError> {
        let appointment = self.fetch(appointment_id).await?;
        let snapshot = self.snapshot.current().await?;
        Ok(summarize(&snapshot, appointment, self.now()))
    }

    pub async fn check_conflicts(&self, query: ConflictCheckQuery) -> Result<ConflictCheckResponse, AppointmentError> {
        let time = parse_slot_time(&query.time)?;
        self.conflict_service
            .check_conflicts(query.date, time, query.exclude_appointment_id)
            .await
    }

    pub async fn stats(&self) -> Result<AppointmentStats, AppointmentError> {
        let snapshot = self.snapshot.current().await?;
        let now = self.now();
        let today = now.date();

        let mut stats = AppointmentStats::default();
        for appointment in &snapshot.appointments {
            *stats.by_status.entry(appointment.status).or_insert(0) += 1;
            if appointment.is_blocked() {
                continue;
            }

            stats.total_appointments += 1;
            if !appointment.occupies_slot() {
                continue;
            }
            if appointment.date == today {
                stats.today_appointments += 1;
            }
            if !is_past(appointment.date, appointment.time, now) {
                stats.upcoming_appointments += 1;
            }
        }

        Ok(stats)
    }

    // ==============================================================================
    // HELPERS
    // ==============================================================================

    async fn fetch(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    /// Snapshot fast path, then the authoritative store re-check.
    async fn ensure_free(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let snapshot = self.snapshot.current().await?;
        validate_no_conflict(&snapshot.appointments, date, time, exclude_appointment_id)?;
        self.conflict_service.ensure_slot_free(date, time, exclude_appointment_id).await
    }

    /// Undoes a patient created for a booking that did not go through.
    async fn discard_patient(&self, patient_id: Uuid) {
        match self.patients.delete_patient(patient_id).await {
            Ok(()) => debug!("Discarded patient {} after failed booking", patient_id),
            Err(e) => warn!("Could not discard patient {} after failed booking: {}", patient_id, e),
        }
    }

    fn ensure_future_candidate(&self, date: NaiveDate, time: NaiveTime) -> Result<(), AppointmentError> {
        if is_past(date, time, self.now()) {
            return Err(AppointmentError::ValidationError(format!(
                "{} {} is in the past",
                date,
                format_slot_time(time)
            )));
        }
        Ok(())
    }

    fn check_slot_time(&self, raw: &str) -> Result<NaiveTime, AppointmentError> {
        let time = parse_slot_time(raw)?;
        if !self.opening_hours.contains(time) {
            return Err(AppointmentError::ValidationError(format!(
                "{} is not a bookable slot",
                format_slot_time(time)
            )));
        }
        Ok(time)
    }

    fn check_hospital(&self, hospital_id: &str) -> Result<String, AppointmentError> {
        let hospital_id = hospital_id.trim();
        if hospital_id.is_empty() {
            return Err(AppointmentError::ValidationError("Hospital is required".to_string()));
        }
        if !self.hospitals.is_empty() && !self.hospitals.iter().any(|h| h == hospital_id) {
            return Err(AppointmentError::ValidationError(format!("Unknown hospital '{}'", hospital_id)));
        }
        Ok(hospital_id.to_string())
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppointmentError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppointmentError::ValidationError(format!("Field '{}' is required", field)))
}

/// The partial unique index is the last word on slot ownership.
fn slot_write_error(error: StoreError, date: NaiveDate, time: NaiveTime) -> AppointmentError {
    if error.is_unique_violation() {
        warn!("Store rejected {} {}: slot was just taken", date, format_slot_time(time));
        AppointmentError::Conflict { date, time }
    } else {
        AppointmentError::Store(error)
    }
}

fn summarize(snapshot: &ClinicSnapshot, appointment: Appointment, now: NaiveDateTime) -> AppointmentSummary {
    let patient = snapshot.patient(appointment.patient_id);
    AppointmentSummary {
        patient_name: patient.map(|p| p.name.clone()),
        patient_phone: patient.map(|p| p.phone.clone()),
        is_past: is_past(appointment.date, appointment.time, now),
        appointment,
    }
}
