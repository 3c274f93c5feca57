use std::env;
use std::time::Duration;
use tracing::warn;

const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub remote_timeout_secs: u64,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            remote_timeout_secs: parse_or_default("REMOTE_TIMEOUT_SECS", DEFAULT_REMOTE_TIMEOUT_SECS),
            port: parse_or_default("PORT", DEFAULT_PORT),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// Config pointing at a single backend, with defaults for everything else.
    pub fn for_backend(supabase_url: &str, supabase_anon_key: &str, supabase_jwt_secret: &str) -> Self {
        Self {
            supabase_url: supabase_url.to_string(),
            supabase_anon_key: supabase_anon_key.to_string(),
            supabase_jwt_secret: supabase_jwt_secret.to_string(),
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            port: DEFAULT_PORT,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
