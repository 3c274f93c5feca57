// libs/appointment-cell/src/services/store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use shared_database::supabase::SupabaseError;

use crate::models::{
    Appointment, AppointmentError, AppointmentPatch, AppointmentSearchQuery, AppointmentStatus,
    NewAppointment,
};

/// Persistence seam for appointments. The booking service only ever talks
/// to this trait, so tests can run against an in-memory implementation.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError>;

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError>;

    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError>;

    /// Conditional write: the patch lands only while the row still holds one of
    /// `expected`. `Ok(None)` means nothing matched, either because the row moved
    /// on or because it is gone.
    async fn update(
        &self,
        id: Uuid,
        expected: &[AppointmentStatus],
        patch: AppointmentPatch,
    ) -> Result<Option<Appointment>, AppointmentError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppointmentError>;
}

/// PostgREST-backed store on the `appointments` table, acting with the
/// caller's token so row level security applies.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: impl Into<String>) -> Self {
        Self {
            supabase,
            auth_token: auth_token.into(),
        }
    }

    fn remote(e: anyhow::Error) -> AppointmentError {
        AppointmentError::RemoteUnavailable(e.to_string())
    }

    /// A write refused by the overlap constraint. The conflicting row is not
    /// named in the reply, so the id stays nil until the caller resolves it.
    fn write_failed(e: anyhow::Error) -> AppointmentError {
        match e.downcast_ref::<SupabaseError>() {
            Some(SupabaseError::Conflict(detail)) => {
                debug!("Write refused by constraint: {}", detail);
                AppointmentError::Conflict { appointment_id: Uuid::nil() }
            }
            None => Self::remote(e),
        }
    }

    fn parse_one(rows: Vec<Value>, action: &str) -> Result<Appointment, AppointmentError> {
        let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| {
            AppointmentError::RemoteUnavailable(format!("Failed to parse {} appointment: {}", action, e))
        })
    }
}

/// PostgREST query string for a search. Date bounds select every appointment
/// whose interval overlaps `[from_date, to_date)`.
pub fn search_path(query: &AppointmentSearchQuery) -> String {
    let mut query_parts = Vec::new();

    if let Some(clinic_id) = query.clinic_id {
        query_parts.push(format!("clinic_id=eq.{}", clinic_id));
    }
    if let Some(patient_id) = query.patient_id {
        query_parts.push(format!("patient_id=eq.{}", patient_id));
    }
    if let Some(provider_id) = query.provider_id {
        query_parts.push(format!("provider_id=eq.{}", provider_id));
    }
    if let Some(status) = query.status {
        query_parts.push(format!("status=eq.{}", status));
    }
    if let Some(from_date) = query.from_date {
        let date_str = from_date.to_rfc3339();
        query_parts.push(format!("scheduled_end=gt.{}", urlencoding::encode(&date_str)));
    }
    if let Some(to_date) = query.to_date {
        let date_str = to_date.to_rfc3339();
        query_parts.push(format!("scheduled_start=lt.{}", urlencoding::encode(&date_str)));
    }

    query_parts.push("order=scheduled_start.asc".to_string());

    if let Some(limit) = query.limit {
        query_parts.push(format!("limit={}", limit));
    }
    if let Some(offset) = query.offset {
        query_parts.push(format!("offset={}", offset));
    }

    format!("/rest/v1/appointments?{}", query_parts.join("&"))
}

/// PostgREST target for a write guarded by the row's current status.
pub fn conditional_path(id: Uuid, expected: &[AppointmentStatus]) -> String {
    let spellings: Vec<&str> = expected
        .iter()
        .flat_map(|status| status.stored_spellings().iter().copied())
        .collect();

    format!(
        "/rest/v1/appointments?id=eq.{}&status=in.({})",
        id,
        urlencoding::encode(&spellings.join(","))
    )
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn list(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let path = search_path(query);
        debug!("Listing appointments: {}", path);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.auth_token),
            None,
        ).await.map_err(Self::remote)?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::RemoteUnavailable(format!("Failed to parse appointments: {}", e)))
    }

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", id);

        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.auth_token),
            None,
        ).await.map_err(Self::remote)?;

        Self::parse_one(result, "fetched")
    }

    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let body = json!({
            "clinic_id": appointment.clinic_id,
            "patient_id": appointment.patient_id,
            "provider_id": appointment.provider_id,
            "scheduled_start": appointment.scheduled_start.to_rfc3339(),
            "scheduled_end": appointment.candidate().scheduled_end().to_rfc3339(),
            "duration_minutes": appointment.duration_minutes,
            "status": appointment.status,
            "priority": appointment.priority,
            "notes": appointment.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(&self.auth_token),
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await.map_err(Self::write_failed)?;

        if result.is_empty() {
            return Err(AppointmentError::RemoteUnavailable("Failed to create appointment".to_string()));
        }

        Self::parse_one(result, "created")
    }

    async fn update(
        &self,
        id: Uuid,
        expected: &[AppointmentStatus],
        patch: AppointmentPatch,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut body = serde_json::to_value(&patch)
            .map_err(|e| AppointmentError::ValidationError(format!("Invalid update: {}", e)))?;
        if let Value::Object(ref mut fields) = body {
            fields.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        }

        let path = conditional_path(id, expected);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(&self.auth_token),
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await.map_err(Self::write_failed)?;

        if result.is_empty() {
            debug!("Update of appointment {} matched no row in {:?}", id, expected);
            return Ok(None);
        }

        Self::parse_one(result, "updated").map(Some)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(&self.auth_token),
            None,
            Some(SupabaseClient::return_representation()),
        ).await.map_err(Self::remote)?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        Ok(())
    }
}
