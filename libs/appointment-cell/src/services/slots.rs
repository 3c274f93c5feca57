// libs/appointment-cell/src/services/slots.rs
use chrono::Duration;
use tracing::debug;

use crate::models::{AppointmentError, OperatingWindow, TimeSlot};

/// Build the day's grid of candidate slots for one appointment length.
///
/// Slots start at `open_time + k * granularity` and never run past
/// `close_time`. When the duration is longer than the granularity the step
/// grows to the next multiple of the granularity so that slots never overlap.
pub fn generate_slots(
    window: &OperatingWindow,
    duration_minutes: i32,
) -> Result<Vec<TimeSlot>, AppointmentError> {
    let granularity = window.slot_granularity_minutes as i64;
    let duration = duration_minutes as i64;

    if granularity <= 0 {
        return Err(AppointmentError::InvalidWindowConfig(format!(
            "Slot granularity must be positive, got {}",
            granularity
        )));
    }
    if duration <= 0 {
        return Err(AppointmentError::InvalidWindowConfig(format!(
            "Appointment duration must be positive, got {}",
            duration
        )));
    }
    if window.open_time >= window.close_time {
        return Err(AppointmentError::InvalidWindowConfig(format!(
            "Opening time {} is not before closing time {}",
            window.open_time, window.close_time
        )));
    }

    let step = Duration::minutes(step_minutes(granularity, duration));
    let length = Duration::minutes(duration);
    let close = window.closes_at();

    let mut slots = Vec::new();
    let mut current = window.opens_at();

    while current + length <= close {
        slots.push(TimeSlot::available(current, duration_minutes));
        current += step;
    }

    debug!(
        "Generated {} slots of {} minutes for clinic {} on {}",
        slots.len(), duration, window.clinic_id, window.date
    );

    Ok(slots)
}

/// Smallest multiple of `granularity` that is at least `duration`.
fn step_minutes(granularity: i64, duration: i64) -> i64 {
    if duration <= granularity {
        granularity
    } else {
        ((duration + granularity - 1) / granularity) * granularity
    }
}
