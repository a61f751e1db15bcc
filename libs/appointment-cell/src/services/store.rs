// libs/appointment-cell/src/services/store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{rest_path, urlencode, PAGE_SIZE};
use shared_database::{ChangeFeed, StoreError, SupabaseClient};

use crate::models::{civil_datetime, Appointment, AppointmentChanges, AppointmentRow, NewAppointment};

const TABLE: &str = "appointments";

/// Tenant-scoped access to appointment rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError>;

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Non-cancelled rows holding exactly `(date, time)`.
    async fn appointments_at(&self, date: NaiveDate, time: NaiveTime) -> Result<Vec<Appointment>, StoreError>;

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError>;

    async fn update_appointment(&self, id: Uuid, changes: AppointmentChanges) -> Result<Appointment, StoreError>;

    async fn delete_appointment(&self, id: Uuid) -> Result<(), StoreError>;

    async fn count_patient_appointments(&self, patient_id: Uuid) -> Result<usize, StoreError>;

    /// Returns how many rows were removed.
    async fn delete_patient_appointments(&self, patient_id: Uuid) -> Result<usize, StoreError>;
}

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    tenant: String,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            supabase,
            tenant: config.clinic_tenant.clone(),
        }
    }

    async fn select(&self, filters: &[String]) -> Result<Vec<Appointment>, StoreError> {
        let path = rest_path(TABLE, &self.tenant, filters);
        let rows: Vec<AppointmentRow> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    fn by_id(&self, id: Uuid) -> String {
        rest_path(TABLE, &self.tenant, &[format!("id=eq.{}", id)])
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        debug!("Fetching appointments for tenant {}", self.tenant);
        let path = rest_path(TABLE, &self.tenant, &["order=appointment_date.asc,id.asc".to_string()]);
        let rows: Vec<AppointmentRow> = self.supabase.select_all(&path, PAGE_SIZE).await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let filters = [format!("id=eq.{}", id), "limit=1".to_string()];
        Ok(self.select(&filters).await?.into_iter().next())
    }

    async fn appointments_at(&self, date: NaiveDate, time: NaiveTime) -> Result<Vec<Appointment>, StoreError> {
        let stamp = civil_datetime::format(&date.and_time(time));
        debug!("Re-checking slot {} against the store", stamp);

        self.select(&[
            format!("appointment_date=eq.{}", urlencode(&stamp)),
            "status=neq.cancelled".to_string(),
        ]).await
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let body = json!({
            "tenant_id": self.tenant,
            "hospital_id": appointment.hospital_id,
            "patient_id": appointment.patient_id,
            "appointment_date": civil_datetime::format(&appointment.date.and_time(appointment.time)),
            "status": appointment.status,
            "reason": appointment.reason,
            "service_name": appointment.service_name,
            "notes": appointment.notes,
            "created_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<AppointmentRow> = self.supabase
            .write_returning(Method::POST, &format!("/rest/v1/{}", TABLE), Some(body))
            .await?;

        rows.into_iter()
            .next()
            .map(Appointment::from)
            .ok_or_else(|| StoreError::InvalidRecord("Insert returned no appointment row".to_string()))
    }

    async fn update_appointment(&self, id: Uuid, changes: AppointmentChanges) -> Result<Appointment, StoreError> {
        let mut update_data = serde_json::Map::new();

        if let Some((date, time)) = changes.slot {
            update_data.insert(
                "appointment_date".to_string(),
                json!(civil_datetime::format(&date.and_time(time))),
            );
        }
        if let Some(status) = changes.status {
            update_data.insert("status".to_string(), json!(status));
        }
        if let Some(notes) = changes.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }

        let rows: Vec<AppointmentRow> = self.supabase
            .write_returning(Method::PATCH, &self.by_id(id), Some(Value::Object(update_data)))
            .await?;

        rows.into_iter()
            .next()
            .map(Appointment::from)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", id)))
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), StoreError> {
        let rows: Vec<Value> = self.supabase.write_returning(Method::DELETE, &self.by_id(id), None).await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("appointment {}", id)));
        }
        Ok(())
    }

    async fn count_patient_appointments(&self, patient_id: Uuid) -> Result<usize, StoreError> {
        let path = rest_path(TABLE, &self.tenant, &[
            "select=id".to_string(),
            format!("patient_id=eq.{}", patient_id),
            "order=id.asc".to_string(),
        ]);
        let ids: Vec<Value> = self.supabase.select_all(&path, PAGE_SIZE).await?;
        Ok(ids.len())
    }

    async fn delete_patient_appointments(&self, patient_id: Uuid) -> Result<usize, StoreError> {
        let path = rest_path(TABLE, &self.tenant, &[format!("patient_id=eq.{}", patient_id)]);
        let rows: Vec<Value> = self.supabase.write_returning(Method::DELETE, &path, None).await?;
        Ok(rows.len())
    }
}

/// Process-local store. Enforces the same one-live-row-per-slot rule as the
/// partial unique index and publishes every write on the change feed.
#[derive(Default)]
pub struct MemoryAppointmentStore {
    appointments: RwLock<Vec<Appointment>>,
    feed: Option<ChangeFeed>,
}

impl MemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            appointments: RwLock::new(Vec::new()),
            feed: Some(feed),
        }
    }

    /// Seeds rows without the uniqueness check, e.g. to model a writer that
    /// committed behind the snapshot's back.
    pub async fn seed(&self, appointment: Appointment) {
        self.appointments.write().await.push(appointment);
    }

    fn notify(&self) {
        if let Some(feed) = &self.feed {
            feed.notify();
        }
    }
}

fn slot_taken(rows: &[Appointment], date: NaiveDate, time: NaiveTime, except: Option<Uuid>) -> bool {
    rows.iter()
        .any(|a| Some(a.id) != except && a.occupies_slot() && a.is_at(date, time))
}

#[async_trait]
impl AppointmentStore for MemoryAppointmentStore {
    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        let mut appointments = self.appointments.read().await.clone();
        appointments.sort_by_key(|a| a.civil_instant());
        Ok(appointments)
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.iter().find(|a| a.id == id).cloned())
    }

    async fn appointments_at(&self, date: NaiveDate, time: NaiveTime) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.appointments.read().await
            .iter()
            .filter(|a| a.occupies_slot() && a.is_at(date, time))
            .cloned()
            .collect())
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let created = {
            let mut rows = self.appointments.write().await;
            if appointment.status.occupies_slot() && slot_taken(&rows, appointment.date, appointment.time, None) {
                return Err(StoreError::UniqueViolation(format!(
                    "appointment_date {} already taken",
                    civil_datetime::format(&appointment.date.and_time(appointment.time))
                )));
            }

            let created = Appointment {
                id: Uuid::new_v4(),
                hospital_id: appointment.hospital_id,
                patient_id: appointment.patient_id,
                date: appointment.date,
                time: appointment.time,
                status: appointment.status,
                reason: appointment.reason,
                service_name: appointment.service_name,
                notes: appointment.notes,
                created_at: Some(Utc::now()),
            };
            rows.push(created.clone());
            created
        };

        self.notify();
        Ok(created)
    }

    async fn update_appointment(&self, id: Uuid, changes: AppointmentChanges) -> Result<Appointment, StoreError> {
        let updated = {
            let mut rows = self.appointments.write().await;
            let index = rows
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("appointment {}", id)))?;

            let mut candidate = rows[index].clone();
            changes.apply_to(&mut candidate);
            if candidate.occupies_slot() && slot_taken(&rows, candidate.date, candidate.time, Some(id)) {
                return Err(StoreError::UniqueViolation(format!(
                    "appointment_date {} already taken",
                    civil_datetime::format(&candidate.civil_instant())
                )));
            }

            rows[index] = candidate.clone();
            candidate
        };

        self.notify();
        Ok(updated)
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), StoreError> {
        {
            let mut rows = self.appointments.write().await;
            let before = rows.len();
            rows.retain(|a| a.id != id);
            if rows.len() == before {
                return Err(StoreError::NotFound(format!("appointment {}", id)));
            }
        }

        self.notify();
        Ok(())
    }

    async fn count_patient_appointments(&self, patient_id: Uuid) -> Result<usize, StoreError> {
        Ok(self.appointments.read().await
            .iter()
            .filter(|a| a.patient_id == patient_id)
            .count())
    }

    async fn delete_patient_appointments(&self, patient_id: Uuid) -> Result<usize, StoreError> {
        let removed = {
            let mut rows = self.appointments.write().await;
            let before = rows.len();
            rows.retain(|a| a.patient_id != patient_id);
            before - rows.len()
        };

        if removed > 0 {
            self.notify();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::models::{AppointmentStatus, VisitReason};

    fn new_appointment(time: NaiveTime) -> NewAppointment {
        NewAppointment {
            hospital_id: "centro".to_string(),
            patient_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            time,
            status: AppointmentStatus::Confirmed,
            reason: Some(VisitReason::FirstVisit),
            service_name: None,
            notes: None,
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_rejects_second_live_row() {
        let store = MemoryAppointmentStore::new();
        store.insert_appointment(new_appointment(at(9, 0))).await.unwrap();

        let mut other = new_appointment(at(9, 0));
        other.hospital_id = "norte".to_string();
        assert_matches!(store.insert_appointment(other).await, Err(StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_cancelled_row_does_not_hold_slot() {
        let store = MemoryAppointmentStore::new();
        let first = store.insert_appointment(new_appointment(at(9, 0))).await.unwrap();
        store
            .update_appointment(first.id, AppointmentChanges { status: Some(AppointmentStatus::Cancelled), ..Default::default() })
            .await
            .unwrap();

        store.insert_appointment(new_appointment(at(9, 0))).await.unwrap();
        assert_eq!(store.appointments_at(first.date, at(9, 0)).await.unwrap().len(), 1);
        assert_eq!(store.list_appointments().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_into_taken_slot_is_rejected() {
        let store = MemoryAppointmentStore::new();
        let nine = store.insert_appointment(new_appointment(at(9, 0))).await.unwrap();
        let ten = store.insert_appointment(new_appointment(at(10, 0))).await.unwrap();

        let move_to_nine = AppointmentChanges { slot: Some((nine.date, at(9, 0))), ..Default::default() };
        assert_matches!(
            store.update_appointment(ten.id, move_to_nine.clone()).await,
            Err(StoreError::UniqueViolation(_))
        );
        // Moving onto its own slot is not a violation.
        store.update_appointment(nine.id, move_to_nine).await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_publish_on_feed() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        let store = MemoryAppointmentStore::with_feed(feed);

        let created = store.insert_appointment(new_appointment(at(9, 0))).await.unwrap();
        store.delete_appointment(created.id).await.unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delete_patient_appointments_counts_rows() {
        let store = MemoryAppointmentStore::new();
        let first = new_appointment(at(9, 0));
        let patient_id = first.patient_id;
        let mut second = new_appointment(at(9, 30));
        second.patient_id = patient_id;

        store.insert_appointment(first).await.unwrap();
        store.insert_appointment(second).await.unwrap();
        store.insert_appointment(new_appointment(at(10, 0))).await.unwrap();

        assert_eq!(store.count_patient_appointments(patient_id).await.unwrap(), 2);
        assert_eq!(store.delete_patient_appointments(patient_id).await.unwrap(), 2);
        assert_eq!(store.list_appointments().await.unwrap().len(), 1);
        assert_matches!(store.delete_appointment(Uuid::new_v4()).await, Err(StoreError::NotFound(_)));
    }
}
