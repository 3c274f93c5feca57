use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

const STAFF_ROLES: &[&str] = &["admin", "dentist", "doctor", "receptionist", "staff"];

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    /// Clinic personnel acting on behalf of any patient.
    pub fn is_staff(&self) -> bool {
        self.role
            .as_deref()
            .map(|role| STAFF_ROLES.contains(&role))
            .unwrap_or(false)
    }

    pub fn is_patient(&self) -> bool {
        self.has_role("patient")
    }
}
