// libs/appointment-cell/src/services/conflict.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookingCandidate, SlotClassification,
    SlotState, TimeSlot,
};

/// Minimum notice a patient must give to cancel on their own.
pub const CANCELLATION_NOTICE_HOURS: i64 = 24;

/// Half-open interval overlap: `[a, b)` and `[c, d)` share at least one instant.
pub fn intervals_overlap(
    a: DateTime<Utc>,
    b: DateTime<Utc>,
    c: DateTime<Utc>,
    d: DateTime<Utc>,
) -> bool {
    a < d && c < b
}

/// Whether an existing appointment holds the provider's time. Cancelled rows never do.
fn holds_provider(appointment: &Appointment, provider_id: Uuid) -> bool {
    appointment.provider_id == Some(provider_id) && !appointment.is_cancelled()
}

/// Decide whether one slot is free for the given provider.
///
/// Without a provider every slot is open: "any provider" bookings are never
/// checked against individual schedules.
pub fn classify(
    slot: &TimeSlot,
    appointments: &[Appointment],
    provider_id: Option<Uuid>,
) -> SlotClassification {
    let Some(provider_id) = provider_id else {
        return SlotClassification { available: true, occupying_appointment: None };
    };

    let occupying = appointments.iter().find(|appointment| {
        holds_provider(appointment, provider_id)
            && intervals_overlap(
                slot.start_time,
                slot.end_time,
                appointment.scheduled_start,
                appointment.scheduled_end(),
            )
    });

    SlotClassification {
        available: occupying.is_none(),
        occupying_appointment: occupying.cloned(),
    }
}

/// Tag every slot of a generated grid as available or occupied.
pub fn classify_slots(
    slots: Vec<TimeSlot>,
    appointments: &[Appointment],
    provider_id: Option<Uuid>,
) -> Vec<TimeSlot> {
    slots
        .into_iter()
        .map(|slot| {
            let state = match classify(&slot, appointments, provider_id).occupying_appointment {
                Some(appointment) => SlotState::Occupied { appointment_id: appointment.id },
                None => SlotState::Available,
            };
            TimeSlot { state, ..slot }
        })
        .collect()
}

/// Final check before a write: the candidate must not overlap any live
/// appointment of its provider other than itself.
pub fn validate_booking(
    candidate: &BookingCandidate,
    appointments: &[Appointment],
) -> Result<(), AppointmentError> {
    let Some(provider_id) = candidate.provider_id else {
        return Ok(());
    };

    if candidate.duration_minutes <= 0 {
        return Err(AppointmentError::ValidationError(
            "Appointment duration must be positive".to_string(),
        ));
    }

    let end = candidate.scheduled_end();
    let conflict = appointments.iter().find(|appointment| {
        Some(appointment.id) != candidate.appointment_id
            && holds_provider(appointment, provider_id)
            && intervals_overlap(
                candidate.scheduled_start,
                end,
                appointment.scheduled_start,
                appointment.scheduled_end(),
            )
    });

    match conflict {
        Some(existing) => {
            warn!(
                "Provider {} already has appointment {} between {} and {}",
                provider_id, existing.id, existing.scheduled_start, existing.scheduled_end()
            );
            Err(AppointmentError::Conflict { appointment_id: existing.id })
        }
        None => {
            debug!("No conflict for provider {} at {}", provider_id, candidate.scheduled_start);
            Ok(())
        }
    }
}

/// Patient self-service cancellation: only upcoming scheduled or confirmed
/// visits with more than the required notice.
pub fn can_cancel(appointment: &Appointment, now: DateTime<Utc>) -> bool {
    matches!(
        appointment.status,
        AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
    ) && appointment.scheduled_start - now > Duration::hours(CANCELLATION_NOTICE_HOURS)
}
