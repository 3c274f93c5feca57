use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        let mut config = AppConfig::for_backend(
            &self.supabase_url,
            &self.supabase_anon_key,
            &self.jwt_secret,
        );
        config.remote_timeout_secs = 2;
        config
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn dentist(email: &str) -> Self {
        Self::new(email, "dentist")
    }

    pub fn receptionist(email: &str) -> Self {
        Self::new(email, "receptionist")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    /// A row of the `appointments` table as PostgREST returns it.
    pub fn appointment_row(
        id: Uuid,
        patient_id: &str,
        provider_id: Option<&str>,
        scheduled_start: DateTime<Utc>,
        duration_minutes: i64,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "clinic_id": null,
            "patient_id": patient_id,
            "provider_id": provider_id,
            "scheduled_start": scheduled_start.to_rfc3339(),
            "scheduled_end": (scheduled_start + Duration::minutes(duration_minutes)).to_rfc3339(),
            "duration_minutes": duration_minutes,
            "status": status,
            "priority": "normal",
            "notes": "",
            "actual_start_time": null,
            "actual_end_time": null,
            "cancelled_by": null,
            "cancelled_at": null,
            "cancellation_reason": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    /// A row of the `clinic_operating_hours` table.
    pub fn operating_hours_row(
        clinic_id: &str,
        day_of_week: i32,
        open_time: &str,
        close_time: &str,
        slot_granularity_minutes: i32,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "clinic_id": clinic_id,
            "day_of_week": day_of_week,
            "specific_date": null,
            "open_time": open_time,
            "close_time": close_time,
            "slot_granularity_minutes": slot_granularity_minutes,
            "is_closed": false
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::dentist("doc@example.com");
        assert_eq!(user.email, "doc@example.com");
        assert_eq!(user.role, "dentist");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
        assert!(user_model.is_staff());
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_appointment_row_derives_end() {
        let start = "2025-03-03T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let row = MockSupabaseResponses::appointment_row(
            Uuid::new_v4(), "patient", None, start, 45, "scheduled",
        );

        assert_eq!(row["scheduled_end"], "2025-03-03T09:45:00+00:00");
        assert!(row["provider_id"].is_null());
    }
}
