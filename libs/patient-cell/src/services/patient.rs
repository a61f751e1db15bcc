use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    BookingIdentity, ContactDetails, NewPatient, Patient, PatientChanges, PatientError, PatientSearchQuery,
    UpdatePatientRequest,
};
use crate::services::store::PatientStore;

const DEFAULT_PAGE_SIZE: usize = 50;

pub struct PatientService {
    store: Arc<dyn PatientStore>,
}

impl PatientService {
    pub fn new(store: Arc<dyn PatientStore>) -> Self {
        Self { store }
    }

    /// Exact match on email first, then on the (name, phone) pair.
    async fn find_existing(&self, contact: &ContactDetails) -> Result<Option<Patient>, PatientError> {
        if let Some(email) = &contact.email {
            if let Some(patient) = self.store.find_by_email(email).await? {
                return Ok(Some(patient));
            }
        }

        Ok(self.store.find_by_name_and_phone(&contact.name, &contact.phone).await?)
    }

    /// Read-only: works out which identity a booking attaches to. Nothing is
    /// written until the caller has secured the slot.
    pub async fn identify_for_booking(&self, contact: ContactDetails) -> Result<BookingIdentity, PatientError> {
        let contact = contact.normalized();
        if contact.name.is_empty() {
            return Err(PatientError::ValidationError("Patient name is required".to_string()));
        }
        if contact.phone.is_empty() {
            return Err(PatientError::ValidationError("Patient phone is required".to_string()));
        }
        if contact.is_system() {
            return Err(PatientError::ValidationError("This contact is reserved".to_string()));
        }

        Ok(match self.find_existing(&contact).await? {
            Some(patient) => {
                let refresh = patient.contact_differs(&contact).then_some(contact);
                debug!("Booking attaches to existing patient {}", patient.id);
                BookingIdentity::Existing { patient, refresh }
            }
            None => BookingIdentity::New(contact),
        })
    }

    pub async fn create_patient(&self, contact: ContactDetails) -> Result<Patient, PatientError> {
        let created = self.store.insert_patient(NewPatient::from(contact.normalized())).await?;
        info!("Created patient {}", created.id);
        Ok(created)
    }

    pub async fn refresh_contact(&self, patient_id: Uuid, contact: &ContactDetails) -> Result<Patient, PatientError> {
        info!("Refreshing contact details for patient {}", patient_id);
        Ok(self.store.update_patient(patient_id, PatientChanges::contact(contact)).await?)
    }

    /// Sentinel identity owning blocked slots; created on first use.
    pub async fn ensure_system_patient(&self) -> Result<Patient, PatientError> {
        let system = ContactDetails::system();
        if let Some(existing) = self.store.find_by_name_and_phone(&system.name, &system.phone).await? {
            return Ok(existing);
        }

        info!("Creating system patient for blocked slots");
        Ok(self.store.insert_patient(NewPatient::from(system)).await?)
    }

    pub async fn get_patient(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        self.store
            .find_patient(patient_id)
            .await?
            .ok_or(PatientError::NotFound)
    }

    pub async fn search_patients(&self, query: PatientSearchQuery) -> Result<Vec<Patient>, PatientError> {
        debug!("Searching patients with query: {:?}", query);

        let patients = self.store.list_patients().await?;
        Ok(filter_patients(patients, &query))
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
    ) -> Result<Patient, PatientError> {
        let changes = PatientChanges {
            name: non_blank(request.name, "name")?,
            email: request.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
            phone: non_blank(request.phone, "phone")?,
            notes: None,
            medical_history: request.medical_history,
        };

        if changes.is_empty() {
            return self.get_patient(patient_id).await;
        }

        self.apply_changes(patient_id, changes).await
    }

    pub async fn update_notes(&self, patient_id: Uuid, notes: String) -> Result<Patient, PatientError> {
        let changes = PatientChanges {
            notes: Some(notes),
            ..PatientChanges::default()
        };
        self.apply_changes(patient_id, changes).await
    }

    pub async fn delete_patient(&self, patient_id: Uuid) -> Result<(), PatientError> {
        self.get_patient(patient_id).await?;
        self.store.delete_patient(patient_id).await?;
        info!("Deleted patient {}", patient_id);
        Ok(())
    }

    async fn apply_changes(&self, patient_id: Uuid, changes: PatientChanges) -> Result<Patient, PatientError> {
        self.get_patient(patient_id).await?;
        Ok(self.store.update_patient(patient_id, changes).await?)
    }
}

fn non_blank(value: Option<String>, field: &str) -> Result<Option<String>, PatientError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Err(PatientError::ValidationError(format!("Patient {} cannot be empty", field))),
        other => Ok(other),
    }
}

/// Case-insensitive substring filters, system patient hidden, then paging.
pub fn filter_patients(patients: Vec<Patient>, query: &PatientSearchQuery) -> Vec<Patient> {
    let contains = |field: Option<&str>, needle: &Option<String>| match needle {
        Some(needle) => field
            .map(|f| f.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
        None => true,
    };

    patients
        .into_iter()
        .filter(|p| !p.is_system())
        .filter(|p| contains(Some(&p.name), &query.name))
        .filter(|p| contains(p.email.as_deref(), &query.email))
        .filter(|p| contains(Some(&p.phone), &query.phone))
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::services::store::MemoryPatientStore;

    fn service() -> PatientService {
        PatientService::new(Arc::new(MemoryPatientStore::new()))
    }

    #[tokio::test]
    async fn test_new_contact_is_identified_without_writing() {
        let service = service();

        let identity = service
            .identify_for_booking(ContactDetails::new(" Ana Souza ", Some("ana@mail.com"), "111"))
            .await
            .unwrap();

        assert_eq!(identity, BookingIdentity::New(ContactDetails::new("Ana Souza", Some("ana@mail.com"), "111")));
        assert!(service.search_patients(PatientSearchQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_email_reuses_identity_and_defers_refresh() {
        let service = service();
        let first = service
            .create_patient(ContactDetails::new("Ana", Some("ana@mail.com"), "111"))
            .await
            .unwrap();

        let identity = service
            .identify_for_booking(ContactDetails::new("Ana Souza", Some("ana@mail.com"), "222"))
            .await
            .unwrap();

        let refresh = assert_matches!(identity, BookingIdentity::Existing { patient, refresh: Some(refresh) } => {
            assert_eq!(patient.id, first.id);
            refresh
        });
        assert_eq!(service.get_patient(first.id).await.unwrap().phone, "111");

        let refreshed = service.refresh_contact(first.id, &refresh).await.unwrap();
        assert_eq!(refreshed.name, "Ana Souza");
        assert_eq!(refreshed.phone, "222");
    }

    #[tokio::test]
    async fn test_name_and_phone_match_without_email() {
        let service = service();
        let first = service.create_patient(ContactDetails::new("Bia", None, "333")).await.unwrap();

        assert_matches!(
            service.identify_for_booking(ContactDetails::new("Bia", None, "333")).await,
            Ok(BookingIdentity::Existing { patient, refresh: None }) if patient.id == first.id
        );
        assert_matches!(
            service.identify_for_booking(ContactDetails::new("Bia", Some("bia@mail.com"), "333")).await,
            Ok(BookingIdentity::Existing { refresh: Some(_), .. })
        );
    }

    #[tokio::test]
    async fn test_missing_or_reserved_contact_is_rejected() {
        let service = service();

        assert_matches!(
            service.identify_for_booking(ContactDetails::new(" ", None, "111")).await,
            Err(PatientError::ValidationError(_))
        );
        assert_matches!(
            service.identify_for_booking(ContactDetails::new("Ana", None, "")).await,
            Err(PatientError::ValidationError(_))
        );
        assert_matches!(
            service.identify_for_booking(ContactDetails::system()).await,
            Err(PatientError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn test_system_patient_is_created_once_and_hidden() {
        let service = service();

        let first = service.ensure_system_patient().await.unwrap();
        let second = service.ensure_system_patient().await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.is_system());
        assert!(service.search_patients(PatientSearchQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_notes_and_unknown_patient() {
        let service = service();
        let patient = service
            .create_patient(ContactDetails::new("Caio", None, "444"))
            .await
            .unwrap();

        let updated = service.update_notes(patient.id, "Retorno em 30 dias".to_string()).await.unwrap();
        assert_eq!(updated.notes.as_deref(), Some("Retorno em 30 dias"));

        assert_matches!(
            service.update_notes(Uuid::new_v4(), "x".to_string()).await,
            Err(PatientError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_search_filters_case_insensitively() {
        let service = service();
        for (name, phone) in [("Ana Souza", "111"), ("Bruno Lima", "222"), ("Ana Clara", "333")] {
            service.create_patient(ContactDetails::new(name, None, phone)).await.unwrap();
        }

        let query = PatientSearchQuery {
            name: Some("ana".to_string()),
            ..PatientSearchQuery::default()
        };
        let found = service.search_patients(query).await.unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.name.starts_with("Ana")));
    }
}
