// libs/clinic-cell/src/models.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// OPERATING WINDOW
// ==============================================================================

/// Open/close times and slot granularity of one clinic on one day.
///
/// Times are interpreted in UTC. The window is read-only input to slot
/// generation; it is validated there, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingWindow {
    pub clinic_id: Uuid,
    pub date: NaiveDate,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub slot_granularity_minutes: i32,
}

impl OperatingWindow {
    pub fn opens_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.open_time).and_utc()
    }

    pub fn closes_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.close_time).and_utc()
    }
}

// ==============================================================================
// STORED CONFIGURATION
// ==============================================================================

/// A row of `clinic_operating_hours`. Weekly rows carry a `day_of_week`
/// (0 = Sunday); rows with a `specific_date` override the weekly row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingHours {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub day_of_week: i32,
    pub specific_date: Option<NaiveDate>,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub slot_granularity_minutes: i32,
    #[serde(default)]
    pub is_closed: bool,
}

impl OperatingHours {
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        match self.specific_date {
            Some(specific) => specific == date,
            None => self.day_of_week == day_of_week(date),
        }
    }

    pub fn window_for(&self, date: NaiveDate) -> OperatingWindow {
        OperatingWindow {
            clinic_id: self.clinic_id,
            date,
            open_time: self.open_time,
            close_time: self.close_time,
            slot_granularity_minutes: self.slot_granularity_minutes,
        }
    }
}

/// 0 = Sunday, 1 = Monday, etc.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertOperatingHoursRequest {
    pub day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub slot_granularity_minutes: i32,
    pub is_closed: Option<bool>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClinicError {
    #[error("Operating hours are not configured for this clinic and day")]
    NotConfigured,

    #[error("Clinic is closed on {0}")]
    Closed(NaiveDate),

    #[error("Invalid operating hours: {0}")]
    InvalidHours(String),

    #[error("Clinic backend unavailable: {0}")]
    RemoteUnavailable(String),
}
