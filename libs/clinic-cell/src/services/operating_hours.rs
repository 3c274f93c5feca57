use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    day_of_week, ClinicError, OperatingHours, OperatingWindow, UpsertOperatingHoursRequest,
};

pub struct OperatingHoursService {
    supabase: Arc<SupabaseClient>,
}

impl OperatingHoursService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Resolve the operating window of a clinic for one date.
    pub async fn get_operating_window(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<OperatingWindow, ClinicError> {
        debug!("Resolving operating window for clinic {} on {}", clinic_id, date);

        let rows = self.get_operating_hours(clinic_id, auth_token).await?;
        let hours = select_hours(&rows, date).ok_or(ClinicError::NotConfigured)?;

        if hours.is_closed {
            debug!("Clinic {} is closed on {}", clinic_id, date);
            return Err(ClinicError::Closed(date));
        }

        Ok(hours.window_for(date))
    }

    /// All configured rows for a clinic, weekly and date specific.
    pub async fn get_operating_hours(
        &self,
        clinic_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<OperatingHours>, ClinicError> {
        let path = format!(
            "/rest/v1/clinic_operating_hours?clinic_id=eq.{}&order=day_of_week.asc",
            clinic_id
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ClinicError::RemoteUnavailable(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<OperatingHours>, _>>()
            .map_err(|e| ClinicError::RemoteUnavailable(format!("Failed to parse operating hours: {}", e)))
    }

    /// Create or replace the weekly (or date specific) row for a clinic.
    pub async fn upsert_operating_hours(
        &self,
        clinic_id: Uuid,
        request: UpsertOperatingHoursRequest,
        auth_token: &str,
    ) -> Result<OperatingHours, ClinicError> {
        let day = validate_request(&request)?;

        let body = json!({
            "clinic_id": clinic_id,
            "day_of_week": day,
            "specific_date": request.specific_date,
            "open_time": request.open_time.format("%H:%M:%S").to_string(),
            "close_time": request.close_time.format("%H:%M:%S").to_string(),
            "slot_granularity_minutes": request.slot_granularity_minutes,
            "is_closed": request.is_closed.unwrap_or(false),
        });

        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/clinic_operating_hours?on_conflict=clinic_id,day_of_week,specific_date",
            Some(auth_token),
            Some(body),
            Some(headers),
        ).await.map_err(|e| ClinicError::RemoteUnavailable(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            warn!("Upsert of operating hours for clinic {} returned no row", clinic_id);
            ClinicError::RemoteUnavailable("Operating hours were not saved".to_string())
        })?;

        let hours: OperatingHours = serde_json::from_value(row)
            .map_err(|e| ClinicError::RemoteUnavailable(format!("Failed to parse operating hours: {}", e)))?;

        info!("Operating hours saved for clinic {} (day {})", clinic_id, hours.day_of_week);
        Ok(hours)
    }
}

/// A date specific row wins over the weekly row for that weekday.
pub fn select_hours(rows: &[OperatingHours], date: NaiveDate) -> Option<&OperatingHours> {
    rows.iter()
        .find(|row| row.specific_date == Some(date))
        .or_else(|| rows.iter().find(|row| row.specific_date.is_none() && row.applies_to(date)))
}

/// Returns the weekday the row is stored under.
fn validate_request(request: &UpsertOperatingHoursRequest) -> Result<i32, ClinicError> {
    let day = match (request.day_of_week, request.specific_date) {
        (_, Some(date)) => day_of_week(date),
        (Some(day), None) if (0..=6).contains(&day) => day,
        (Some(_), None) => {
            return Err(ClinicError::InvalidHours(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        (None, None) => {
            return Err(ClinicError::InvalidHours(
                "Either day_of_week or specific_date is required".to_string(),
            ));
        }
    };

    if request.open_time >= request.close_time {
        return Err(ClinicError::InvalidHours("Open time must be before close time".to_string()));
    }

    if request.slot_granularity_minutes <= 0 {
        return Err(ClinicError::InvalidHours("Slot granularity must be positive".to_string()));
    }

    Ok(day)
}
