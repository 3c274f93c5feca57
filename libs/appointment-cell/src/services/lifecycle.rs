// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Who moves an appointment, when, and why.
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub now: DateTime<Utc>,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

impl TransitionContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now, actor: None, reason: None }
    }
}

/// All valid next statuses for a given current status
pub fn valid_transitions(from: AppointmentStatus) -> &'static [AppointmentStatus] {
    use AppointmentStatus::*;

    match from {
        Scheduled => &[Confirmed, CheckedIn, Cancelled, NoShow],
        Confirmed => &[CheckedIn, Cancelled, NoShow],
        CheckedIn => &[InProgress, Cancelled],
        InProgress => &[Completed],
        // Terminal states and administrative holds
        Completed | Cancelled | NoShow | Blocked => &[],
    }
}

pub fn validate_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if !valid_transitions(from).contains(&to) {
        warn!("Invalid status transition attempted: {} -> {}", from, to);
        return Err(AppointmentError::IllegalTransition { from, to });
    }

    debug!("Status transition validated: {} -> {}", from, to);
    Ok(())
}

pub fn is_terminal(status: AppointmentStatus) -> bool {
    matches!(
        status,
        AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
    )
}

/// Statuses of visits that have not started yet and can still be moved.
pub const RESCHEDULABLE: &[AppointmentStatus] = &[AppointmentStatus::Scheduled, AppointmentStatus::Confirmed];

pub fn ensure_reschedulable(status: AppointmentStatus) -> Result<(), AppointmentError> {
    if RESCHEDULABLE.contains(&status) {
        return Ok(());
    }
    Err(AppointmentError::IllegalTransition { from: status, to: status })
}

/// Validate and apply a transition, stamping the timestamps it implies.
/// The input is left untouched; callers persist the returned copy.
pub fn apply_transition(
    appointment: &Appointment,
    to: AppointmentStatus,
    ctx: &TransitionContext,
) -> Result<Appointment, AppointmentError> {
    validate_transition(appointment.status, to)?;

    let mut updated = appointment.clone();
    updated.status = to;
    updated.updated_at = ctx.now;

    match to {
        AppointmentStatus::InProgress => updated.actual_start_time = Some(ctx.now),
        AppointmentStatus::Completed => updated.actual_end_time = Some(ctx.now),
        AppointmentStatus::Cancelled => {
            updated.cancelled_by = ctx.actor.clone();
            updated.cancelled_at = Some(ctx.now);
            updated.cancellation_reason = ctx.reason.clone();
        }
        _ => {}
    }

    Ok(updated)
}
