use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{rest_path, urlencode, PAGE_SIZE};
use shared_database::{ChangeFeed, StoreError, SupabaseClient};

use crate::models::{NewPatient, Patient, PatientChanges};

const TABLE: &str = "patients";

/// Tenant-scoped access to patient rows.
#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Patient>, StoreError>;

    async fn find_by_name_and_phone(&self, name: &str, phone: &str) -> Result<Option<Patient>, StoreError>;

    async fn insert_patient(&self, patient: NewPatient) -> Result<Patient, StoreError>;

    async fn update_patient(&self, id: Uuid, changes: PatientChanges) -> Result<Patient, StoreError>;

    async fn delete_patient(&self, id: Uuid) -> Result<(), StoreError>;
}

pub struct SupabasePatientStore {
    supabase: Arc<SupabaseClient>,
    tenant: String,
}

impl SupabasePatientStore {
    pub fn new(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            supabase,
            tenant: config.clinic_tenant.clone(),
        }
    }

    async fn select(&self, filters: &[String]) -> Result<Vec<Patient>, StoreError> {
        let path = rest_path(TABLE, &self.tenant, filters);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    async fn select_one(&self, filters: Vec<String>) -> Result<Option<Patient>, StoreError> {
        let mut filters = filters;
        filters.push("limit=1".to_string());
        Ok(self.select(&filters).await?.into_iter().next())
    }
}

#[async_trait]
impl PatientStore for SupabasePatientStore {
    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        debug!("Fetching patients for tenant {}", self.tenant);
        let path = rest_path(TABLE, &self.tenant, &["order=name.asc,id.asc".to_string()]);
        self.supabase.select_all(&path, PAGE_SIZE).await
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        self.select_one(vec![format!("id=eq.{}", id)]).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Patient>, StoreError> {
        self.select_one(vec![format!("email=eq.{}", urlencode(email))]).await
    }

    async fn find_by_name_and_phone(&self, name: &str, phone: &str) -> Result<Option<Patient>, StoreError> {
        self.select_one(vec![
            format!("name=eq.{}", urlencode(name)),
            format!("phone=eq.{}", urlencode(phone)),
        ]).await
    }

    async fn insert_patient(&self, patient: NewPatient) -> Result<Patient, StoreError> {
        let now = Utc::now().to_rfc3339();
        let body = json!({
            "tenant_id": self.tenant,
            "name": patient.name,
            "email": patient.email,
            "phone": patient.phone,
            "notes": patient.notes,
            "medical_history": patient.medical_history,
            "created_at": now,
            "updated_at": now,
        });

        let rows: Vec<Patient> = self.supabase
            .write_returning(Method::POST, &format!("/rest/v1/{}", TABLE), Some(body))
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidRecord("Insert returned no patient row".to_string()))
    }

    async fn update_patient(&self, id: Uuid, changes: PatientChanges) -> Result<Patient, StoreError> {
        let mut update_data = serde_json::Map::new();

        if let Some(name) = changes.name {
            update_data.insert("name".to_string(), json!(name));
        }
        if let Some(email) = changes.email {
            update_data.insert("email".to_string(), json!(email));
        }
        if let Some(phone) = changes.phone {
            update_data.insert("phone".to_string(), json!(phone));
        }
        if let Some(notes) = changes.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }
        if let Some(history) = changes.medical_history {
            update_data.insert("medical_history".to_string(), json!(history));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = rest_path(TABLE, &self.tenant, &[format!("id=eq.{}", id)]);
        let rows: Vec<Patient> = self.supabase
            .write_returning(Method::PATCH, &path, Some(Value::Object(update_data)))
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("patient {}", id)))
    }

    async fn delete_patient(&self, id: Uuid) -> Result<(), StoreError> {
        let path = rest_path(TABLE, &self.tenant, &[format!("id=eq.{}", id)]);
        let rows: Vec<Value> = self.supabase.write_returning(Method::DELETE, &path, None).await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("patient {}", id)));
        }
        Ok(())
    }
}

/// Process-local store used in development mode and tests. Publishes every
/// write on the change feed the way the realtime channel would.
#[derive(Default)]
pub struct MemoryPatientStore {
    patients: RwLock<Vec<Patient>>,
    feed: Option<ChangeFeed>,
}

impl MemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            patients: RwLock::new(Vec::new()),
            feed: Some(feed),
        }
    }

    fn notify(&self) {
        if let Some(feed) = &self.feed {
            feed.notify();
        }
    }
}

#[async_trait]
impl PatientStore for MemoryPatientStore {
    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let mut patients = self.patients.read().await.clone();
        patients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(patients)
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self.patients.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Patient>, StoreError> {
        Ok(self.patients.read().await
            .iter()
            .find(|p| p.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_name_and_phone(&self, name: &str, phone: &str) -> Result<Option<Patient>, StoreError> {
        Ok(self.patients.read().await
            .iter()
            .find(|p| p.name == name && p.phone == phone)
            .cloned())
    }

    async fn insert_patient(&self, patient: NewPatient) -> Result<Patient, StoreError> {
        let now = Utc::now();
        let created = Patient {
            id: Uuid::new_v4(),
            name: patient.name,
            email: patient.email,
            phone: patient.phone,
            notes: patient.notes,
            medical_history: patient.medical_history,
            created_at: Some(now),
            updated_at: Some(now),
        };

        self.patients.write().await.push(created.clone());
        self.notify();
        Ok(created)
    }

    async fn update_patient(&self, id: Uuid, changes: PatientChanges) -> Result<Patient, StoreError> {
        let updated = {
            let mut patients = self.patients.write().await;
            let patient = patients
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("patient {}", id)))?;

            changes.apply_to(patient);
            patient.updated_at = Some(Utc::now());
            patient.clone()
        };

        self.notify();
        Ok(updated)
    }

    async fn delete_patient(&self, id: Uuid) -> Result<(), StoreError> {
        {
            let mut patients = self.patients.write().await;
            let before = patients.len();
            patients.retain(|p| p.id != id);
            if patients.len() == before {
                return Err(StoreError::NotFound(format!("patient {}", id)));
            }
        }

        self.notify();
        Ok(())
    }
}
