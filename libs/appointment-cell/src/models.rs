// libs/appointment-cell/src/models.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use patient_cell::models::{ContactDetails, Patient, PatientError};
use shared_database::StoreError;

/// Length of one bookable slot.
pub const SLOT_MINUTES: u32 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub hospital_id: String,
    pub patient_id: Uuid,
    /// Civil date in the clinic's timezone.
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    /// Absent only on blocked slots.
    pub reason: Option<VisitReason>,
    pub service_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn civil_instant(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn occupies_slot(&self) -> bool {
        self.status.occupies_slot()
    }

    pub fn is_at(&self, date: NaiveDate, time: NaiveTime) -> bool {
        self.date == date && self.time == time
    }

    pub fn is_blocked(&self) -> bool {
        self.status == AppointmentStatus::Blocked
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    WaitingRoom,
    InProgress,
    Finished,
    Blocked,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Confirmed,
        AppointmentStatus::WaitingRoom,
        AppointmentStatus::InProgress,
        AppointmentStatus::Finished,
        AppointmentStatus::Blocked,
        AppointmentStatus::Cancelled,
    ];

    /// Everything except `cancelled` holds its `(date, time)`.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::WaitingRoom => "waiting_room",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Finished => "finished",
            AppointmentStatus::Blocked => "blocked",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum VisitReason {
    FirstVisit,
    FollowUp,
    /// Requires a `service_name`.
    SpecificService,
}

impl fmt::Display for VisitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitReason::FirstVisit => write!(f, "first-visit"),
            VisitReason::FollowUp => write!(f, "follow-up"),
            VisitReason::SpecificService => write!(f, "specific-service"),
        }
    }
}

// ==============================================================================
// STORE ROW MODELS
// ==============================================================================

/// Persisted shape: date and time travel as one offset-less civil timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRow {
    pub id: Uuid,
    pub hospital_id: String,
    pub patient_id: Uuid,
    #[serde(with = "civil_datetime")]
    pub appointment_date: NaiveDateTime,
    pub status: AppointmentStatus,
    pub reason: Option<VisitReason>,
    pub service_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            hospital_id: row.hospital_id,
            patient_id: row.patient_id,
            date: row.appointment_date.date(),
            time: row.appointment_date.time(),
            status: row.status,
            reason: row.reason,
            service_name: row.service_name,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

impl From<&Appointment> for AppointmentRow {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id,
            hospital_id: appointment.hospital_id.clone(),
            patient_id: appointment.patient_id,
            appointment_date: appointment.civil_instant(),
            status: appointment.status,
            reason: appointment.reason,
            service_name: appointment.service_name.clone(),
            notes: appointment.notes.clone(),
            created_at: appointment.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub hospital_id: String,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub reason: Option<VisitReason>,
    pub service_name: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentChanges {
    pub slot: Option<(NaiveDate, NaiveTime)>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

impl AppointmentChanges {
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some((date, time)) = self.slot {
            appointment.date = date;
            appointment.time = time;
        }
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(notes) = &self.notes {
            appointment.notes = Some(notes.clone());
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Booking flow submission. Required fields are optional here so a missing
/// one is reported as a validation error instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub hospital_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub reason: Option<VisitReason>,
    pub service_name: Option<String>,
    pub notes: Option<String>,
}

/// A booking request that passed field validation.
#[derive(Debug, Clone)]
pub struct ValidatedBooking {
    pub contact: ContactDetails,
    pub hospital_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: VisitReason,
    pub service_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    pub patient: Patient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: NaiveDate,
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSlotRequest {
    pub hospital_id: String,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub date: Option<NaiveDate>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub hospital_id: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub patient_id: Option<Uuid>,
}

impl AppointmentSearchQuery {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.date.map_or(true, |d| appointment.date == d)
            && self.from_date.map_or(true, |d| appointment.date >= d)
            && self.to_date.map_or(true, |d| appointment.date <= d)
            && self.hospital_id.as_ref().map_or(true, |h| &appointment.hospital_id == h)
            && self.status.map_or(true, |s| appointment.status == s)
            && self.patient_id.map_or(true, |p| appointment.patient_id == p)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlotsResponse {
    pub date: NaiveDate,
    pub slots: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckQuery {
    pub date: NaiveDate,
    pub time: String,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointment: Option<Appointment>,
}

// ==============================================================================
// DASHBOARD MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSummary {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_name: Option<String>,
    pub patient_phone: Option<String>,
    pub is_past: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentStats {
    pub total_appointments: usize,
    pub by_status: BTreeMap<AppointmentStatus, usize>,
    pub today_appointments: usize,
    pub upcoming_appointments: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("This slot was just taken: {date} {}", .time.format("%H:%M"))]
    Conflict { date: NaiveDate, time: NaiveTime },

    #[error("Appointment on {date} at {} is in the past and can no longer be changed", .time.format("%H:%M"))]
    PastAppointment { date: NaiveDate, time: NaiveTime },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PatientError> for AppointmentError {
    fn from(error: PatientError) -> Self {
        match error {
            PatientError::NotFound => AppointmentError::PatientNotFound,
            PatientError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            PatientError::Store(e) => AppointmentError::Store(e),
        }
    }
}

// ==============================================================================
// WIRE FORMATS
// ==============================================================================

pub fn parse_slot_time(raw: &str) -> Result<NaiveTime, AppointmentError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| AppointmentError::ValidationError(format!("Invalid time '{}', expected HH:MM", raw)))
}

pub fn format_slot_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// `HH:MM` on the API surface.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_slot_time(&raw).map_err(de::Error::custom)
    }
}

/// `{date}T{time}:00` with no offset. On read only the wall-clock part is
/// kept, so a store that appends `+00:00` cannot shift the appointment.
pub mod civil_datetime {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid civil timestamp '{}'", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let normalized = raw.trim().replacen(' ', "T", 1);
        let wall_clock = normalized.get(..19)?;
        NaiveDateTime::parse_from_str(wall_clock, FORMAT).ok()
    }

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }
}
