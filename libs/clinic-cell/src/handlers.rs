// libs/clinic-cell/src/handlers.rs
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

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ClinicError, UpsertOperatingHoursRequest};
use crate::services::OperatingHoursService;

#[derive(Debug, Deserialize)]
pub struct OperatingWindowQuery {
    pub date: NaiveDate,
}

impl From<ClinicError> for AppError {
    fn from(e: ClinicError) -> Self {
        match e {
            ClinicError::NotConfigured => AppError::NotFound(e.to_string()),
            ClinicError::Closed(_) => AppError::NotFound(e.to_string()),
            ClinicError::InvalidHours(msg) => AppError::ValidationError(msg),
            ClinicError::RemoteUnavailable(msg) => AppError::ServiceUnavailable(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn get_operating_window(
    State(state): State<Arc<AppConfig>>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<OperatingWindowQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = OperatingHoursService::new(&state);

    let window = service.get_operating_window(clinic_id, query.date, auth.token()).await?;

    Ok(Json(json!(window)))
}

#[axum::debug_handler]
pub async fn upsert_operating_hours(
    State(state): State<Arc<AppConfig>>,
    Path(clinic_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertOperatingHoursRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only clinic admins can configure operating hours".to_string()));
    }

    let service = OperatingHoursService::new(&state);
    let hours = service.upsert_operating_hours(clinic_id, request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "operating_hours": hours,
        "message": "Operating hours saved"
    })))
}
