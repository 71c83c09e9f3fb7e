//! Hub configuration from environment variables.

use std::env;

/// Configuration for the storage-and-aggregation core.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Path to the SQLite database file
    pub db_path: String,

    /// SQLite busy timeout in milliseconds
    pub sqlite_timeout_ms: u64,

    /// Connection acquisition attempts before giving up
    pub sqlite_retries: u32,

    /// Fixed delay between acquisition attempts in milliseconds
    pub sqlite_retry_delay_ms: u64,

    /// Restrict total-energy queries to the current calendar month
    pub energy_monthly_reset: bool,

    /// Months of history to keep; 0 or less disables truncation
    pub history_retention_months: i32,

    /// Maximum hours aggregated per scheduler tick
    pub aggregate_limit_hours: u32,

    /// Scheduler tick interval in seconds
    pub aggregate_interval_secs: u64,

    /// Power factor applied to current-sensing conversions
    pub power_factor: f64,

    /// Mains voltage applied to current-sensing conversions
    pub mains_voltage: f64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            db_path: "data/readings.db".to_string(),
            sqlite_timeout_ms: 5_000,
            sqlite_retries: 5,
            sqlite_retry_delay_ms: 200,
            energy_monthly_reset: false,
            history_retention_months: 0,
            aggregate_limit_hours: 1_000,
            aggregate_interval_secs: 300,
            power_factor: 0.6,
            mains_voltage: 230.0,
        }
    }
}

impl HubConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `WATTFLOW_DB_PATH` (default: data/readings.db)
    /// - `SQLITE_TIMEOUT_MS` (default: 5000)
    /// - `SQLITE_RETRIES` (default: 5)
    /// - `SQLITE_RETRY_DELAY_MS` (default: 200)
    /// - `ENERGY_MONTHLY_RESET` (default: false)
    /// - `HISTORY_RETENTION_MONTHS` (default: 0, disabled)
    /// - `AGGREGATE_LIMIT_HOURS` (default: 1000)
    /// - `AGGREGATE_INTERVAL_SECS` (default: 300)
    /// - `POWER_FACTOR` (default: 0.6)
    /// - `MAINS_VOLTAGE` (default: 230)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: env::var("WATTFLOW_DB_PATH").unwrap_or(defaults.db_path),

            sqlite_timeout_ms: env::var("SQLITE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sqlite_timeout_ms),

            sqlite_retries: env::var("SQLITE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sqlite_retries),

            sqlite_retry_delay_ms: env::var("SQLITE_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sqlite_retry_delay_ms),

            energy_monthly_reset: env::var("ENERGY_MONTHLY_RESET")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.energy_monthly_reset),

            history_retention_months: env::var("HISTORY_RETENTION_MONTHS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.history_retention_months),

            aggregate_limit_hours: env::var("AGGREGATE_LIMIT_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.aggregate_limit_hours),

            aggregate_interval_secs: env::var("AGGREGATE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.aggregate_interval_secs),

            power_factor: env::var("POWER_FACTOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.power_factor),

            mains_voltage: env::var("MAINS_VOLTAGE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.mains_voltage),
        }
    }
}

/// Accepts the same truthy spellings as the original deployment tooling.
fn parse_bool(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
