// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use chrono::NaiveDate;
use uuid::Uuid;

use clinic_cell::services::OperatingHoursService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, BlockTimeRequest,
    BookAppointmentRequest, CancelAppointmentRequest, RescheduleAppointmentRequest,
    UpdateStatusRequest,
};
use crate::services::{AppointmentBookingService, CancellationPolicy, ProviderLocks};

/// Router state: configuration plus the commit locks shared by every request.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub locks: ProviderLocks,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config, locks: ProviderLocks::new() }
    }

    fn booking_service(&self, auth_token: &str) -> AppointmentBookingService {
        AppointmentBookingService::for_request(&self.config, self.locks.clone(), auth_token)
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub clinic_id: Uuid,
    pub date: NaiveDate,
    pub provider_id: Option<Uuid>,
    /// Defaults to the clinic's slot granularity.
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::InvalidWindowConfig(msg) => AppError::Internal(msg),
            AppointmentError::Conflict { .. } => AppError::Conflict(e.to_string()),
            AppointmentError::IllegalTransition { .. } => AppError::Unprocessable(e.to_string()),
            AppointmentError::CancellationWindowClosed { .. } => AppError::Unprocessable(e.to_string()),
            AppointmentError::RemoteUnavailable(msg) => AppError::ServiceUnavailable(msg),
            AppointmentError::NotFound => AppError::NotFound(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Unauthorized(msg) => AppError::Forbidden(msg),
        }
    }
}

// ==============================================================================
// AUTHORIZATION HELPERS
// ==============================================================================

fn require_staff(user: &User, action: &str) -> Result<(), AppError> {
    if !user.is_staff() {
        return Err(AppError::Forbidden(format!("Only clinic staff can {}", action)));
    }
    Ok(())
}

fn ensure_owner_or_staff(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    if user.is_staff() || appointment.patient_id.to_string() == user.id {
        return Ok(());
    }
    Err(AppError::Forbidden("Not authorized to access this appointment".to_string()))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<AppointmentState>,
    Query(query): Query<AvailabilityQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if let Some(duration) = query.duration_minutes {
        if duration <= 0 {
            return Err(AppError::ValidationError(
                "duration_minutes must be positive".to_string(),
            ));
        }
    }

    let hours_service = OperatingHoursService::new(&state.config);
    let window = hours_service.get_operating_window(query.clinic_id, query.date, token).await?;

    let duration = query.duration_minutes.unwrap_or(window.slot_granularity_minutes);
    let availability = state
        .booking_service(token)
        .day_availability(&window, query.provider_id, duration)
        .await?;

    Ok(Json(json!(availability)))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients book for themselves; staff book for anyone
    if !user.is_staff() && request.patient_id.to_string() != user.id {
        return Err(AppError::Forbidden("Not authorized to book appointment for this patient".to_string()));
    }

    let appointment = state.booking_service(auth.token()).create_appointment(request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked"
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<AppointmentState>,
    Query(mut query): Query<AppointmentSearchQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        let own_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Forbidden("Patient identity is not a valid id".to_string()))?;
        query.patient_id = Some(own_id);
    }

    let appointments = state.booking_service(auth.token()).search(query).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking_service(auth.token()).get_appointment(appointment_id).await?;
    ensure_owner_or_staff(&user, &appointment)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = state.booking_service(auth.token());

    let current = service.get_appointment(appointment_id).await?;
    ensure_owner_or_staff(&user, &current)?;

    let appointment = service.reschedule(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled"
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "change appointment status")?;

    let appointment = state
        .booking_service(auth.token())
        .update_status(appointment_id, request.status, Some(user.id.clone()), request.reason)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = state.booking_service(auth.token());

    let current = service.get_appointment(appointment_id).await?;
    ensure_owner_or_staff(&user, &current)?;

    let policy = if user.is_staff() {
        CancellationPolicy::Staff
    } else {
        CancellationPolicy::PatientSelfService
    };

    let appointment = service
        .cancel(appointment_id, request.reason, Some(user.id.clone()), policy)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn check_in(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = state.booking_service(auth.token());

    let current = service.get_appointment(appointment_id).await?;
    ensure_owner_or_staff(&user, &current)?;

    let appointment = service.check_in(appointment_id, Some(user.id.clone())).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Checked in"
    })))
}

// ==============================================================================
// STAFF HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn block_time(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BlockTimeRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "block provider time")?;

    let block = state.booking_service(auth.token()).block_time(request).await?;

    Ok(Json(json!({
        "success": true,
        "block": block
    })))
}

#[axum::debug_handler]
pub async fn delete_block(
    State(state): State<AppointmentState>,
    Path(block_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "remove blocked time")?;

    state.booking_service(auth.token()).delete_block(block_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Block removed"
    })))
}

#[axum::debug_handler]
pub async fn get_provider_day(
    State(state): State<AppointmentState>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "view a provider schedule")?;

    let appointments = state
        .booking_service(auth.token())
        .provider_day(provider_id, query.date)
        .await?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "date": query.date,
        "appointments": appointments
    })))
}

#[axum::debug_handler]
pub async fn get_daily_summary(
    State(state): State<AppointmentState>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user, "view the daily summary")?;

    let summary = state
        .booking_service(auth.token())
        .daily_summary(provider_id, query.date)
        .await?;

    Ok(Json(json!(summary)))
}
