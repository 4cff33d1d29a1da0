//! Server configuration loaded from the environment

use std::time::Duration;

use thiserror::Error;
use tipline_subscriptions::{EngineConfig, MissingAccountPolicy, DEFAULT_SWEEP_TIMEOUT};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5000";
const DEFAULT_JWT_EXPIRY_HOURS: i64 = 168;
/// Accepted token lifetimes, one hour up to a year
const JWT_EXPIRY_HOURS_RANGE: std::ops::RangeInclusive<i64> = 1..=8760;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";
/// Release builds refuse shorter signing secrets
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub sweep_timeout: Duration,
    /// None keeps expiry purely lazy
    pub sweep_interval: Option<Duration>,
    pub missing_account_policy: MissingAccountPolicy,
    pub allowed_origins: Vec<String>,
    pub bootstrap_admin: Option<AdminBootstrap>,
}

#[derive(Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;
        if !cfg!(debug_assertions) && jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {MIN_JWT_SECRET_LEN} characters"),
            });
        }

        let jwt_expiry_hours =
            parse_optional("JWT_EXPIRY_HOURS")?.unwrap_or(DEFAULT_JWT_EXPIRY_HOURS);
        if !JWT_EXPIRY_HOURS_RANGE.contains(&jwt_expiry_hours) {
            return Err(ConfigError::Invalid {
                name: "JWT_EXPIRY_HOURS",
                reason: format!(
                    "must be between {} and {}",
                    JWT_EXPIRY_HOURS_RANGE.start(),
                    JWT_EXPIRY_HOURS_RANGE.end()
                ),
            });
        }

        let sweep_timeout = parse_optional::<u64>("SWEEP_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SWEEP_TIMEOUT);
        let sweep_interval = parse_optional::<u64>("SWEEP_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let missing_account_policy = match std::env::var("MISSING_ACCOUNT_POLICY") {
            Ok(value) => value.parse().map_err(|e| ConfigError::Invalid {
                name: "MISSING_ACCOUNT_POLICY",
                reason: format!("{e}"),
            })?,
            Err(_) => MissingAccountPolicy::default(),
        };

        let bootstrap_admin = match (
            std::env::var("BOOTSTRAP_ADMIN_EMAIL"),
            std::env::var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                Some(AdminBootstrap { email, password })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            jwt_secret,
            jwt_expiry_hours,
            sweep_timeout,
            sweep_interval,
            missing_account_policy,
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            bootstrap_admin,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sweep_timeout: self.sweep_timeout,
            missing_account_policy: self.missing_account_policy,
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_optional<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::Invalid {
                    name,
                    reason: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}
