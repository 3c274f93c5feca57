#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentError, AppointmentPatch, AppointmentPriority, AppointmentSearchQuery,
    AppointmentStatus, NewAppointment, OperatingWindow,
};
use appointment_cell::services::{AppointmentBookingService, AppointmentStore, ProviderLocks};

/// Appointment table kept in memory, with an optional per-call latency to
/// widen the gap between a read and the following write.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<Appointment>>,
    latency: Duration,
    pub inserts: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Self::default() }
    }

    pub fn seed(&self, appointment: Appointment) -> Appointment {
        self.rows.lock().unwrap().push(appointment.clone());
        appointment
    }

    pub fn snapshot(&self) -> Vec<Appointment> {
        self.rows.lock().unwrap().clone()
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn matches(query: &AppointmentSearchQuery, appointment: &Appointment) -> bool {
    query.clinic_id.map_or(true, |id| appointment.clinic_id == Some(id))
        && query.patient_id.map_or(true, |id| appointment.patient_id == id)
        && query.provider_id.map_or(true, |id| appointment.provider_id == Some(id))
        && query.status.map_or(true, |status| appointment.status == status)
        && query.from_date.map_or(true, |from| appointment.scheduled_end() > from)
        && query.to_date.map_or(true, |to| appointment.scheduled_start < to)
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn list(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        self.pause().await;

        let mut found: Vec<Appointment> = self
            .snapshot()
            .into_iter()
            .filter(|appointment| matches(query, appointment))
            .collect();
        found.sort_by_key(|appointment| appointment.scheduled_start);

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(offset).take(limit).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.pause().await;
        self.snapshot()
            .into_iter()
            .find(|appointment| appointment.id == id)
            .ok_or(AppointmentError::NotFound)
    }

    async fn insert(&self, new: NewAppointment) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            clinic_id: new.clinic_id,
            patient_id: new.patient_id,
            provider_id: new.provider_id,
            scheduled_start: new.scheduled_start,
            duration_minutes: new.duration_minutes,
            status: new.status,
            priority: new.priority,
            notes: new.notes,
            actual_start_time: None,
            actual_end_time: None,
            cancelled_by: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(self.seed(appointment))
    }

    async fn update(
        &self,
        id: Uuid,
        expected: &[AppointmentStatus],
        patch: AppointmentPatch,
    ) -> Result<Option<Appointment>, AppointmentError> {
        self.pause().await;

        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows
            .iter_mut()
            .find(|appointment| appointment.id == id && expected.contains(&appointment.status))
        else {
            return Ok(None);
        };

        if let Some(status) = patch.status { row.status = status; }
        if let Some(provider_id) = patch.provider_id { row.provider_id = Some(provider_id); }
        if let Some(start) = patch.scheduled_start { row.scheduled_start = start; }
        if patch.actual_start_time.is_some() { row.actual_start_time = patch.actual_start_time; }
        if patch.actual_end_time.is_some() { row.actual_end_time = patch.actual_end_time; }
        if patch.cancelled_by.is_some() { row.cancelled_by = patch.cancelled_by; }
        if patch.cancelled_at.is_some() { row.cancelled_at = patch.cancelled_at; }
        if patch.cancellation_reason.is_some() { row.cancellation_reason = patch.cancellation_reason; }
        row.updated_at = Utc::now();

        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppointmentError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|appointment| appointment.id != id);
        if rows.len() == before {
            return Err(AppointmentError::NotFound);
        }
        Ok(())
    }
}

// 2025-03-03 is a Monday
pub fn clinic_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
}

pub fn at(hhmm: &str) -> DateTime<Utc> {
    format!("2025-03-03T{}:00Z", hhmm).parse().unwrap()
}

pub fn window(open: &str, close: &str, granularity: i32) -> OperatingWindow {
    OperatingWindow {
        clinic_id: Uuid::new_v4(),
        date: clinic_day(),
        open_time: NaiveTime::parse_from_str(open, "%H:%M").unwrap(),
        close_time: NaiveTime::parse_from_str(close, "%H:%M").unwrap(),
        slot_granularity_minutes: granularity,
    }
}

pub fn appointment(
    provider_id: Option<Uuid>,
    start: DateTime<Utc>,
    duration_minutes: i32,
    status: AppointmentStatus,
) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        clinic_id: None,
        patient_id: Uuid::new_v4(),
        provider_id,
        scheduled_start: start,
        duration_minutes,
        status,
        priority: AppointmentPriority::Normal,
        notes: String::new(),
        actual_start_time: None,
        actual_end_time: None,
        cancelled_by: None,
        cancelled_at: None,
        cancellation_reason: None,
        created_at: start,
        updated_at: start,
    }
}

pub fn service(store: Arc<InMemoryStore>) -> AppointmentBookingService {
    service_with(store, ProviderLocks::new(), Duration::from_secs(2))
}

pub fn service_with(
    store: Arc<InMemoryStore>,
    locks: ProviderLocks,
    remote_timeout: Duration,
) -> AppointmentBookingService {
    AppointmentBookingService::new(store, locks, remote_timeout)
}
