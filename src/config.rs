//! Configuration loader for the `dripbot` webhook receiver.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Alert defaults live here too, so the evaluator
//! receives them as a value instead of reading process-wide constants.
//!
use std::{env, net::SocketAddr};

use anyhow::{anyhow, Result};

use crate::AlertPolicy;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional wait window in minutes (must fit an `i32`).
macro_rules! parse_env_minutes {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<i32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional glucose threshold with a default value.
macro_rules! parse_env_f64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u32 = 587;

/// Sender used when `SENDER_EMAIL` is not set.
const DEFAULT_SENDER: &str = "dripbot@localhost";

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Thresholds and wait windows applied to users without their own.
    pub alert_policy: AlertPolicy,

    /// Age in minutes after which the status page flags a reading as stale.
    pub max_data_age_minutes: u32,

    /// SMTP relay settings; `None` disables email delivery.
    pub email: Option<EmailConfig>,
}

/// SMTP relay settings for alert emails.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub sender: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_ADDR` – bind address (default: `0.0.0.0:8080`)
/// - `DEFAULT_HIGH_THRESHOLD` / `DEFAULT_HIGH_WAIT_MINUTES` (225 / 60)
/// - `DEFAULT_LOW_THRESHOLD` / `DEFAULT_LOW_WAIT_MINUTES` (70 / 30)
/// - `MAX_DATA_AGE_MINUTES` – status page staleness window (default: 20)
/// - `SMTP_HOST`, `SMTP_PORT` (587), `SENDER_EMAIL`, `SMTP_USER`, `SMTP_PASSWORD`
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);

    let listen_addr = env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid LISTEN_ADDR: {}", e))?;

    let defaults = AlertPolicy::default();
    let alert_policy = AlertPolicy {
        high_threshold: parse_env_f64!("DEFAULT_HIGH_THRESHOLD", defaults.high_threshold),
        high_wait_minutes: parse_env_minutes!(
            "DEFAULT_HIGH_WAIT_MINUTES",
            defaults.high_wait_minutes
        ),
        low_threshold: parse_env_f64!("DEFAULT_LOW_THRESHOLD", defaults.low_threshold),
        low_wait_minutes: parse_env_minutes!("DEFAULT_LOW_WAIT_MINUTES", defaults.low_wait_minutes),
    };

    let max_data_age_minutes = parse_env_u32!("MAX_DATA_AGE_MINUTES", 20);

    let email = match env::var("SMTP_HOST") {
        Ok(smtp_host) => {
            let smtp_port = parse_env_u32!("SMTP_PORT", DEFAULT_SMTP_PORT);
            Some(EmailConfig {
                smtp_host,
                smtp_port: u16::try_from(smtp_port)
                    .map_err(|_| anyhow!("Invalid SMTP_PORT: {}", smtp_port))?,
                sender: env::var("SENDER_EMAIL").unwrap_or_else(|_| DEFAULT_SENDER.to_string()),
                smtp_user: env::var("SMTP_USER").ok(),
                smtp_password: env::var("SMTP_PASSWORD").ok(),
            })
        }
        Err(_) => None,
    };

    Ok(Config {
        db_url,
        db_pool_max,
        listen_addr,
        alert_policy,
        max_data_age_minutes,
        email,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let policy = &self.alert_policy;

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL         : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX          : {}", self.db_pool_max);
        tracing::info!("  LISTEN_ADDR          : {}", self.listen_addr);
        tracing::info!(
            "  HIGH THRESHOLD/WAIT  : {} / {} min",
            policy.high_threshold,
            policy.high_wait_minutes
        );
        tracing::info!(
            "  LOW THRESHOLD/WAIT   : {} / {} min",
            policy.low_threshold,
            policy.low_wait_minutes
        );
        tracing::info!("  MAX_DATA_AGE_MINUTES : {}", self.max_data_age_minutes);
        match &self.email {
            Some(email) => tracing::info!(
                "  SMTP                 : {}:{} from {}",
                email.smtp_host,
                email.smtp_port,
                email.sender
            ),
            None => tracing::info!("  SMTP                 : not configured (alerts are logged only)"),
        }
    }
}

/// Replace the password in a connection string with `****`.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}
