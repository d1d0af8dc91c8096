//! Configuration loader for the `codemetal-airwatch` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Engine tunables are handed on as [`EngineSettings`]
//! and [`FanoutSettings`] so the engine itself never reads the environment.
//!
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::fanout::FanoutSettings;
use crate::lifecycle::EngineSettings;
use crate::store::OPEN_ALERT_LIMIT;

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

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Parse an optional, non-empty string environment variable.
macro_rules! optional_env {
    ($var_name:expr) => {
        env::var($var_name).ok().filter(|v| !v.trim().is_empty())
    };
}

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

    /// HTTP listen port.
    pub listen_port: u16,

    /// Trailing window in which a repeat exceedance is suppressed.
    pub dedup_window_mins: u32,

    /// Trailing window of readings covered by each threshold scan.
    pub scan_window_mins: u32,

    /// Cadence of the background threshold scan.
    pub scan_interval_secs: u32,

    /// Per-channel notification delivery timeout.
    pub channel_timeout_secs: u32,

    pub fanout_queue_depth: u32,
    pub fanout_concurrency: u32,

    /// Area used for alerts from sensors without registry metadata.
    pub default_area: Option<String>,

    /// Optional webhook that receives every new alert.
    pub alert_webhook_url: Option<String>,

    /// Optional advisory text generator endpoint.
    pub advisory_api_url: Option<String>,

    /// Optional JSON file overriding the severity ladder.
    pub thresholds_file: Option<PathBuf>,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_PORT` – HTTP port (default: 8080)
/// - `DEDUP_WINDOW_MINS` – dedup window (default: 60)
/// - `SCAN_WINDOW_MINS` – scan window (default: 15)
/// - `SCAN_INTERVAL_SECS` – scan cadence (default: 300)
/// - `CHANNEL_TIMEOUT_SECS` – per-channel delivery timeout (default: 5)
/// - `FANOUT_QUEUE_DEPTH` – buffered notifications (default: 256)
/// - `FANOUT_CONCURRENCY` – concurrent deliveries (default: 4)
/// - `DEFAULT_AREA`, `ALERT_WEBHOOK_URL`, `ADVISORY_API_URL`, `THRESHOLDS_FILE`
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let listen_port = u16::try_from(parse_env_u32!("LISTEN_PORT", 8080))
        .map_err(|e| anyhow!("Invalid LISTEN_PORT: {}", e))?;
    let dedup_window_mins = parse_env_u32!("DEDUP_WINDOW_MINS", 60);
    let scan_window_mins = parse_env_u32!("SCAN_WINDOW_MINS", 15);
    let scan_interval_secs = parse_env_u32!("SCAN_INTERVAL_SECS", 300);
    let channel_timeout_secs = parse_env_u32!("CHANNEL_TIMEOUT_SECS", 5);
    let fanout_queue_depth = parse_env_u32!("FANOUT_QUEUE_DEPTH", 256);
    let fanout_concurrency = parse_env_u32!("FANOUT_CONCURRENCY", 4);

    if scan_interval_secs == 0 {
        return Err(anyhow!("SCAN_INTERVAL_SECS must be greater than zero"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        listen_port,
        dedup_window_mins,
        scan_window_mins,
        scan_interval_secs,
        channel_timeout_secs,
        fanout_queue_depth,
        fanout_concurrency,
        default_area: optional_env!("DEFAULT_AREA"),
        alert_webhook_url: optional_env!("ALERT_WEBHOOK_URL"),
        advisory_api_url: optional_env!("ADVISORY_API_URL"),
        thresholds_file: optional_env!("THRESHOLDS_FILE").map(PathBuf::from),
    })
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            dedup_window: chrono::Duration::minutes(i64::from(self.dedup_window_mins)),
            open_alert_limit: OPEN_ALERT_LIMIT,
        }
    }

    pub fn fanout_settings(&self) -> FanoutSettings {
        FanoutSettings {
            queue_depth: self.fanout_queue_depth as usize,
            max_concurrency: self.fanout_concurrency as usize,
            channel_timeout: self.channel_timeout(),
        }
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.channel_timeout_secs))
    }

    pub fn scan_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.scan_window_mins))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.scan_interval_secs))
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let none = || "-".to_string();

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL         : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX          : {}", self.db_pool_max);
        tracing::info!("  LISTEN_PORT          : {}", self.listen_port);
        tracing::info!("  DEDUP_WINDOW_MINS    : {}", self.dedup_window_mins);
        tracing::info!("  SCAN_WINDOW_MINS     : {}", self.scan_window_mins);
        tracing::info!("  SCAN_INTERVAL_SECS   : {}", self.scan_interval_secs);
        tracing::info!("  CHANNEL_TIMEOUT_SECS : {}", self.channel_timeout_secs);
        tracing::info!("  FANOUT_QUEUE_DEPTH   : {}", self.fanout_queue_depth);
        tracing::info!("  FANOUT_CONCURRENCY   : {}", self.fanout_concurrency);
        tracing::info!(
            "  DEFAULT_AREA         : {}",
            self.default_area.clone().unwrap_or_else(none)
        );
        tracing::info!(
            "  ALERT_WEBHOOK_URL    : {}",
            self.alert_webhook_url.clone().unwrap_or_else(none)
        );
        tracing::info!(
            "  ADVISORY_API_URL     : {}",
            self.advisory_api_url.clone().unwrap_or_else(none)
        );
        tracing::info!(
            "  THRESHOLDS_FILE      : {}",
            self.thresholds_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(none)
        );
    }
}

/// Mask the password in a database URL.
///
/// Only the userinfo part (between `://` and the last `@`) is inspected, so URLs
/// without a password are returned unchanged.
fn mask_db_url(db_url: &str) -> String {
    // ---
    let Some(userinfo_start) = db_url.find("://").map(|i| i + 3) else {
        return db_url.to_string();
    };
    if let Some(at_pos) = db_url[userinfo_start..].rfind('@').map(|i| i + userinfo_start) {
        if let Some(colon_pos) = db_url[userinfo_start..at_pos].find(':').map(|i| i + userinfo_start) {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_mask_db_url() {
        // ---
        assert_eq!(
            mask_db_url("postgres://eco:secret@db:5432/air"),
            "postgres://eco:****@db:5432/air"
        );
        assert_eq!(mask_db_url("postgres://db/air"), "postgres://db/air");
    }

    #[test]
    fn test_mask_db_url_without_password() {
        // ---
        assert_eq!(
            mask_db_url("postgres://eco@db:5432/air"),
            "postgres://eco@db:5432/air"
        );
        assert_eq!(
            mask_db_url("postgres://eco:p@ss:word@db/air"),
            "postgres://eco:****@db/air"
        );
        assert_eq!(mask_db_url("not a url"), "not a url");
    }
}
