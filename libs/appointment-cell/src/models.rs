// libs/appointment-cell/src/models.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use clinic_cell::models::OperatingWindow;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    #[serde(default)]
    pub clinic_id: Option<Uuid>,
    pub patient_id: Uuid,
    /// `None` means "any available provider".
    pub provider_id: Option<Uuid>,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub priority: AppointmentPriority,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.scheduled_start + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == AppointmentStatus::Cancelled
    }
}

/// Every status the clinic uses. Legacy spellings from older clients are
/// accepted on input and always written back in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[serde(alias = "booked", alias = "pending")]
    Scheduled,
    Confirmed,
    #[serde(alias = "checked-in", alias = "arrived")]
    CheckedIn,
    #[serde(alias = "in-progress", alias = "in_procedure", alias = "in-treatment", alias = "in_treatment")]
    InProgress,
    Completed,
    #[serde(alias = "canceled")]
    Cancelled,
    #[serde(alias = "no-show")]
    NoShow,
    Blocked,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl AppointmentStatus {
    /// Every spelling a stored row may carry for this status, canonical first.
    /// Keep in step with the serde aliases above.
    pub fn stored_spellings(&self) -> &'static [&'static str] {
        match self {
            AppointmentStatus::Scheduled => &["scheduled", "booked", "pending"],
            AppointmentStatus::Confirmed => &["confirmed"],
            AppointmentStatus::CheckedIn => &["checked_in", "checked-in", "arrived"],
            AppointmentStatus::InProgress => {
                &["in_progress", "in-progress", "in_procedure", "in-treatment", "in_treatment"]
            }
            AppointmentStatus::Completed => &["completed"],
            AppointmentStatus::Cancelled => &["cancelled", "canceled"],
            AppointmentStatus::NoShow => &["no_show", "no-show"],
            AppointmentStatus::Blocked => &["blocked"],
        }
    }
}

/// Display ordering only; never affects whether a slot can be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentPriority {
    #[default]
    Normal,
    Senior,
    Vip,
    Emergency,
}

impl AppointmentPriority {
    /// Lower ranks are listed first.
    pub fn display_rank(&self) -> u8 {
        match self {
            AppointmentPriority::Emergency => 0,
            AppointmentPriority::Vip => 1,
            AppointmentPriority::Senior => 2,
            AppointmentPriority::Normal => 3,
        }
    }
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// A candidate interval in a day's grid. Computed, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    #[serde(flatten)]
    pub state: SlotState,
}

impl TimeSlot {
    pub fn available(start_time: DateTime<Utc>, duration_minutes: i32) -> Self {
        Self {
            start_time,
            end_time: start_time + Duration::minutes(duration_minutes as i64),
            duration_minutes,
            state: SlotState::Available,
        }
    }

    pub fn is_available(&self) -> bool {
        self.state == SlotState::Available
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    Available,
    Occupied { appointment_id: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotClassification {
    pub available: bool,
    pub occupying_appointment: Option<Appointment>,
}

/// The interval a booking or a move wants to take.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingCandidate {
    /// Set when an existing appointment is being moved, so it never conflicts with itself.
    pub appointment_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
}

impl BookingCandidate {
    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.scheduled_start + Duration::minutes(self.duration_minutes as i64)
    }
}

impl From<&Appointment> for BookingCandidate {
    fn from(appointment: &Appointment) -> Self {
        Self {
            appointment_id: Some(appointment.id),
            provider_id: appointment.provider_id,
            scheduled_start: appointment.scheduled_start,
            duration_minutes: appointment.duration_minutes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub window: OperatingWindow,
    pub provider_id: Option<Uuid>,
    pub duration_minutes: i32,
    pub slots: Vec<TimeSlot>,
}

impl DayAvailability {
    pub fn available_slots(&self) -> impl Iterator<Item = &TimeSlot> {
        self.slots.iter().filter(|slot| slot.is_available())
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub clinic_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub priority: Option<AppointmentPriority>,
    pub notes: Option<String>,
}

/// Administrative hold on a provider's time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockTimeRequest {
    pub clinic_id: Option<Uuid>,
    pub provider_id: Uuid,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start: DateTime<Utc>,
    /// Keeps the current provider when omitted.
    pub new_provider_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub clinic_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    /// Appointments ending after this instant.
    pub from_date: Option<DateTime<Utc>>,
    /// Appointments starting before this instant.
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

impl AppointmentSearchQuery {
    /// Everything of one provider whose interval overlaps `[from, to)`.
    pub fn provider_range(provider_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            provider_id: Some(provider_id),
            from_date: Some(from),
            to_date: Some(to),
            ..Self::default()
        }
    }

    pub fn provider_day(provider_id: Uuid, date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::default()).and_utc();
        Self::provider_range(provider_id, start, start + Duration::days(1))
    }
}

/// Row to insert; the store assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub clinic_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub priority: AppointmentPriority,
    pub notes: String,
}

impl NewAppointment {
    pub fn candidate(&self) -> BookingCandidate {
        BookingCandidate {
            appointment_id: None,
            provider_id: self.provider_id,
            scheduled_start: self.scheduled_start,
            duration_minutes: self.duration_minutes,
        }
    }
}

/// Partial update of an appointment row; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

impl AppointmentPatch {
    /// Status plus whatever side-effect fields the transition wrote.
    pub fn status_change(updated: &Appointment) -> Self {
        Self {
            status: Some(updated.status),
            actual_start_time: updated.actual_start_time,
            actual_end_time: updated.actual_end_time,
            cancelled_by: updated.cancelled_by.clone(),
            cancelled_at: updated.cancelled_at,
            cancellation_reason: updated.cancellation_reason.clone(),
            ..Self::default()
        }
    }

    pub fn move_to(candidate: &BookingCandidate) -> Self {
        Self {
            provider_id: candidate.provider_id,
            scheduled_start: Some(candidate.scheduled_start),
            scheduled_end: Some(candidate.scheduled_end()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub total: usize,
    pub by_status: BTreeMap<AppointmentStatus, usize>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Invalid operating window: {0}")]
    InvalidWindowConfig(String),

    #[error("Requested time conflicts with appointment {appointment_id}")]
    Conflict { appointment_id: Uuid },

    #[error("Appointment cannot move from {from} to {to}")]
    IllegalTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Appointment backend unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Appointment not found")]
    NotFound,

    #[error("Appointments can only be cancelled more than {notice_hours} hours in advance")]
    CancellationWindowClosed { notice_hours: i64 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}
