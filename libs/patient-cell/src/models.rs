use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use shared_database::StoreError;

/// Identity that owns every `blocked` appointment.
pub const SYSTEM_PATIENT_NAME: &str = "Agenda bloqueada";
pub const SYSTEM_PATIENT_PHONE: &str = "0000000000";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    /// Free-text clinical note kept by the physician.
    pub notes: Option<String>,
    pub medical_history: Option<MedicalHistory>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patient {
    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_PATIENT_NAME && self.phone == SYSTEM_PATIENT_PHONE
    }

    /// Whether booking with `contact` would write anything to this row.
    pub fn contact_differs(&self, contact: &ContactDetails) -> bool {
        self.name != contact.name
            || self.phone != contact.phone
            || (contact.email.is_some() && self.email != contact.email)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MedicalHistory {
    pub allergies: Option<String>,
    pub conditions: Option<String>,
    pub medications: Option<String>,
    pub surgeries: Option<String>,
    pub family_history: Option<String>,
    pub blood_type: Option<String>,
}

/// Contact fields collected by the booking flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactDetails {
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
}

impl ContactDetails {
    pub fn new(name: &str, email: Option<&str>, phone: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.map(str::to_string),
            phone: phone.to_string(),
        }
        .normalized()
    }

    /// Trims every field and drops a blank email.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self
                .email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            phone: self.phone.trim().to_string(),
        }
    }

    /// The name and phone pair reserved for the blocked-slot owner.
    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_PATIENT_NAME && self.phone == SYSTEM_PATIENT_PHONE
    }

    pub fn system() -> Self {
        Self {
            name: SYSTEM_PATIENT_NAME.to_string(),
            email: None,
            phone: SYSTEM_PATIENT_PHONE.to_string(),
        }
    }
}

/// Who a booking belongs to, resolved without writing anything yet.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingIdentity {
    /// Known patient; `refresh` carries contact fields to write once the
    /// appointment is stored.
    Existing {
        patient: Patient,
        refresh: Option<ContactDetails>,
    },
    New(ContactDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub notes: Option<String>,
    pub medical_history: Option<MedicalHistory>,
}

impl From<ContactDetails> for NewPatient {
    fn from(contact: ContactDetails) -> Self {
        Self {
            name: contact.name,
            email: contact.email,
            phone: contact.phone,
            notes: None,
            medical_history: None,
        }
    }
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub medical_history: Option<MedicalHistory>,
}

impl PatientChanges {
    pub fn contact(contact: &ContactDetails) -> Self {
        Self {
            name: Some(contact.name.clone()),
            email: contact.email.clone(),
            phone: Some(contact.phone.clone()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.notes.is_none()
            && self.medical_history.is_none()
    }

    pub fn apply_to(&self, patient: &mut Patient) {
        if let Some(name) = &self.name {
            patient.name = name.clone();
        }
        if let Some(email) = &self.email {
            patient.email = Some(email.clone());
        }
        if let Some(phone) = &self.phone {
            patient.phone = phone.clone();
        }
        if let Some(notes) = &self.notes {
            patient.notes = Some(notes.clone());
        }
        if let Some(history) = &self.medical_history {
            patient.medical_history = Some(history.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub medical_history: Option<MedicalHistory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePatientNotesRequest {
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientSearchQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
