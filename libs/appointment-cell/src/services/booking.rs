// libs/appointment-cell/src/services/booking.rs
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentPatch, AppointmentPriority,
    AppointmentSearchQuery, AppointmentStatus, BlockTimeRequest, BookAppointmentRequest,
    BookingCandidate, DailySummary, DayAvailability, NewAppointment, OperatingWindow,
    RescheduleAppointmentRequest,
};
use crate::services::conflict::{can_cancel, classify_slots, validate_booking, CANCELLATION_NOTICE_HOURS};
use crate::services::lifecycle::{
    apply_transition, ensure_reschedulable, validate_transition, TransitionContext, RESCHEDULABLE,
};
use crate::services::locks::ProviderLocks;
use crate::services::slots::generate_slots;
use crate::services::store::{AppointmentStore, SupabaseAppointmentStore};

/// Which cancellation rules bind the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationPolicy {
    /// Patients cancelling their own visit need the full notice period.
    PatientSelfService,
    /// Front desk and clinicians are only bound by the transition table.
    Staff,
}

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    locks: ProviderLocks,
    remote_timeout: Duration,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn AppointmentStore>, locks: ProviderLocks, remote_timeout: Duration) -> Self {
        Self { store, locks, remote_timeout }
    }

    /// Service acting against Supabase on behalf of one caller.
    pub fn for_request(config: &AppConfig, locks: ProviderLocks, auth_token: &str) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let store = SupabaseAppointmentStore::new(supabase, auth_token);
        Self::new(Arc::new(store), locks, config.remote_timeout())
    }

    /// Bound every store call by the configured deadline. No retries.
    async fn remote<T, F>(&self, operation: &str, call: F) -> Result<T, AppointmentError>
    where
        F: Future<Output = Result<T, AppointmentError>>,
    {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} did not answer within {:?}", operation, self.remote_timeout);
                Err(AppointmentError::RemoteUnavailable(format!(
                    "{} timed out after {}s",
                    operation,
                    self.remote_timeout.as_secs()
                )))
            }
        }
    }

    // ==========================================================================
    // AVAILABILITY
    // ==========================================================================

    /// Slots for one day, tagged against a snapshot of the provider's bookings.
    /// Advisory only: the commit path re-checks before writing.
    pub async fn day_availability(
        &self,
        window: &OperatingWindow,
        provider_id: Option<Uuid>,
        duration_minutes: i32,
    ) -> Result<DayAvailability, AppointmentError> {
        let slots = generate_slots(window, duration_minutes)?;

        let appointments = match provider_id {
            Some(provider_id) => {
                let query = AppointmentSearchQuery::provider_range(
                    provider_id,
                    window.opens_at(),
                    window.closes_at(),
                );
                self.remote("Availability lookup", self.store.list(&query)).await?
            }
            None => Vec::new(),
        };

        let slots = classify_slots(slots, &appointments, provider_id);
        debug!(
            "{} of {} slots available on {} for provider {:?}",
            slots.iter().filter(|slot| slot.is_available()).count(),
            slots.len(),
            window.date,
            provider_id
        );

        Ok(DayAvailability {
            window: window.clone(),
            provider_id,
            duration_minutes,
            slots,
        })
    }

    // ==========================================================================
    // COMMIT PATH
    // ==========================================================================

    pub async fn create_appointment(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        validate_duration(request.duration_minutes)?;

        let appointment = NewAppointment {
            clinic_id: request.clinic_id,
            patient_id: request.patient_id,
            provider_id: request.provider_id,
            scheduled_start: request.scheduled_start,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Scheduled,
            priority: request.priority.unwrap_or_default(),
            notes: request.notes.unwrap_or_default(),
        };

        let created = self.commit(appointment).await?;
        info!("Appointment {} booked for patient {}", created.id, created.patient_id);
        Ok(created)
    }

    /// Hold a provider's time (lunch, equipment maintenance).
    pub async fn block_time(&self, request: BlockTimeRequest) -> Result<Appointment, AppointmentError> {
        validate_duration(request.duration_minutes)?;

        let hold = NewAppointment {
            clinic_id: request.clinic_id,
            patient_id: Uuid::nil(),
            provider_id: Some(request.provider_id),
            scheduled_start: request.scheduled_start,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Blocked,
            priority: AppointmentPriority::Normal,
            notes: request.notes.unwrap_or_default(),
        };

        let created = self.commit(hold).await?;
        info!("Blocked {} minutes for provider {} at {}", created.duration_minutes, request.provider_id, created.scheduled_start);
        Ok(created)
    }

    /// Check-then-insert under the provider's lock, against a fresh read.
    #[instrument(skip(self, appointment), fields(provider_id = ?appointment.provider_id, start = %appointment.scheduled_start))]
    async fn commit(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        let Some(provider_id) = appointment.provider_id else {
            return self.remote("Appointment insert", self.store.insert(appointment)).await;
        };

        let candidate = appointment.candidate();
        let _guard = self.locks.acquire(provider_id).await;

        let existing = self.provider_overlapping(provider_id, &candidate).await?;
        validate_booking(&candidate, &existing)?;

        match self.remote("Appointment insert", self.store.insert(appointment)).await {
            Err(AppointmentError::Conflict { .. }) => Err(self.name_conflict(provider_id, &candidate).await),
            other => other,
        }
    }

    /// The database refused an overlapping write made by another process.
    /// Look the winner up so the caller learns which appointment holds the time.
    async fn name_conflict(&self, provider_id: Uuid, candidate: &BookingCandidate) -> AppointmentError {
        warn!("Overlap constraint refused a write for provider {}", provider_id);

        let existing = match self.provider_overlapping(provider_id, candidate).await {
            Ok(existing) => existing,
            Err(e) => return e,
        };
        match validate_booking(candidate, &existing) {
            Err(e) => e,
            // winner not visible to this caller
            Ok(()) => AppointmentError::Conflict { appointment_id: Uuid::nil() },
        }
    }

    /// A conditional write matched nothing: the row changed status after it was
    /// read, or it is gone.
    async fn stale_write(&self, appointment_id: Uuid, to: Option<AppointmentStatus>) -> AppointmentError {
        match self.get_appointment(appointment_id).await {
            Ok(fresh) => {
                warn!("Appointment {} became {} before the write landed", appointment_id, fresh.status);
                AppointmentError::IllegalTransition { from: fresh.status, to: to.unwrap_or(fresh.status) }
            }
            Err(e) => e,
        }
    }

    async fn provider_overlapping(
        &self,
        provider_id: Uuid,
        candidate: &BookingCandidate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let query = AppointmentSearchQuery::provider_range(
            provider_id,
            candidate.scheduled_start,
            candidate.scheduled_end(),
        );
        self.remote("Conflict lookup", self.store.list(&query)).await
    }

    /// Move an appointment that has not started yet, keeping its duration.
    #[instrument(skip(self, request), fields(new_start = %request.new_start))]
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        ensure_reschedulable(current.status)?;

        let candidate = BookingCandidate {
            appointment_id: Some(current.id),
            provider_id: request.new_provider_id.or(current.provider_id),
            scheduled_start: request.new_start,
            duration_minutes: current.duration_minutes,
        };

        let _guard = match candidate.provider_id {
            Some(provider_id) => {
                let guard = self.locks.acquire(provider_id).await;
                let existing = self.provider_overlapping(provider_id, &candidate).await?;
                validate_booking(&candidate, &existing)?;
                Some(guard)
            }
            None => None,
        };

        // the status read above is stale by now; the write re-checks it
        let patch = AppointmentPatch::move_to(&candidate);
        let moved = match self.remote("Appointment update", self.store.update(appointment_id, RESCHEDULABLE, patch)).await {
            Ok(Some(moved)) => moved,
            Ok(None) => return Err(self.stale_write(appointment_id, None).await),
            Err(AppointmentError::Conflict { .. }) => {
                return Err(match candidate.provider_id {
                    Some(provider_id) => self.name_conflict(provider_id, &candidate).await,
                    None => AppointmentError::Conflict { appointment_id: Uuid::nil() },
                });
            }
            Err(e) => return Err(e),
        };

        info!("Appointment {} moved to {}", moved.id, moved.scheduled_start);
        Ok(moved)
    }

    // ==========================================================================
    // LIFECYCLE
    // ==========================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.remote("Appointment lookup", self.store.get(appointment_id)).await
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        actor: Option<String>,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        let ctx = TransitionContext { now: Utc::now(), actor, reason };

        self.persist_transition(&current, new_status, &ctx).await
    }

    /// Front desk (or QR code) check-in.
    pub async fn check_in(
        &self,
        appointment_id: Uuid,
        actor: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.update_status(appointment_id, AppointmentStatus::CheckedIn, actor, None).await
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: String,
        actor: Option<String>,
        policy: CancellationPolicy,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        let now = Utc::now();

        if policy == CancellationPolicy::PatientSelfService {
            validate_transition(current.status, AppointmentStatus::Cancelled)?;
            if !can_cancel(&current, now) {
                warn!("Late cancellation of appointment {} refused", appointment_id);
                return Err(AppointmentError::CancellationWindowClosed {
                    notice_hours: CANCELLATION_NOTICE_HOURS,
                });
            }
        }

        let ctx = TransitionContext { now, actor, reason: Some(reason) };
        self.persist_transition(&current, AppointmentStatus::Cancelled, &ctx).await
    }

    async fn persist_transition(
        &self,
        current: &Appointment,
        to: AppointmentStatus,
        ctx: &TransitionContext,
    ) -> Result<Appointment, AppointmentError> {
        let updated = apply_transition(current, to, ctx)?;

        // lands only if nobody moved the row on since it was read
        let patch = AppointmentPatch::status_change(&updated);
        let saved = self
            .remote("Appointment update", self.store.update(current.id, &[current.status], patch))
            .await?;
        let Some(saved) = saved else {
            return Err(self.stale_write(current.id, Some(to)).await);
        };

        info!("Appointment {} moved from {} to {}", saved.id, current.status, saved.status);
        Ok(saved)
    }

    /// Remove an administrative hold. Real appointments are cancelled, never deleted.
    pub async fn delete_block(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        if current.status != AppointmentStatus::Blocked {
            return Err(AppointmentError::ValidationError(
                "Only blocked time can be deleted".to_string(),
            ));
        }

        self.remote("Appointment delete", self.store.delete(appointment_id)).await?;
        info!("Block {} removed", appointment_id);
        Ok(())
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn search(&self, query: AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);

        if let (Some(from), Some(to)) = (query.from_date, query.to_date) {
            if from >= to {
                return Err(AppointmentError::ValidationError(
                    "from_date must be before to_date".to_string(),
                ));
            }
        }

        self.remote("Appointment search", self.store.list(&query)).await
    }

    /// A provider's day ordered for the chairside list: priority first, then time.
    pub async fn provider_day(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let query = AppointmentSearchQuery::provider_day(provider_id, date);
        let mut appointments = self.remote("Provider schedule", self.store.list(&query)).await?;

        appointments.sort_by(|a, b| {
            a.priority.display_rank()
                .cmp(&b.priority.display_rank())
                .then(a.scheduled_start.cmp(&b.scheduled_start))
        });

        Ok(appointments)
    }

    pub async fn daily_summary(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<DailySummary, AppointmentError> {
        let query = AppointmentSearchQuery::provider_day(provider_id, date);
        let appointments = self.remote("Provider schedule", self.store.list(&query)).await?;

        let mut by_status = BTreeMap::new();
        for appointment in &appointments {
            *by_status.entry(appointment.status).or_insert(0) += 1;
        }

        Ok(DailySummary {
            provider_id,
            date,
            total: appointments.len(),
            by_status,
        })
    }
}

fn validate_duration(duration_minutes: i32) -> Result<(), AppointmentError> {
    if duration_minutes <= 0 {
        return Err(AppointmentError::ValidationError(
            "Appointment duration must be positive".to_string(),
        ));
    }
    Ok(())
}
