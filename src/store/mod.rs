//! Storage engine for sensor readings and derived hourly energy.
//!
//! One embedded SQLite file holds three tables: `labels` (string identities
//! of sensor streams), `readings` (append-only raw observations) and
//! `energy_hourly` (one derived kWh row per fully elapsed hour). All access
//! serializes through the single shared connection owned by
//! [`ConnectionManager`]; the other components take that manager plus their
//! own state by explicit injection.
//!
//! ## Module Organization
//!
//! - `connection` - shared connection, retry policy, schema setup
//! - `labels` - label string to row id registry with write-through cache
//! - `readings` - raw reading appends and energy queries
//! - `aggregate` - hourly time-weighted energy aggregation
//! - `truncate` - rolling retention horizon

pub mod aggregate;
pub mod connection;
pub mod labels;
pub mod readings;
pub mod truncate;

pub use aggregate::HourlyAggregator;
pub use connection::ConnectionManager;
pub use labels::LabelRegistry;
pub use readings::ReadingStore;
pub use truncate::RetentionTruncator;

use chrono::{Datelike, Local, TimeZone};
use std::sync::Arc;

/// Injected clock, in Unix seconds. Tests swap this for deterministic time.
pub type NowFn = Arc<dyn Fn() -> i64 + Send + Sync>;

/// The system clock.
pub fn system_now_fn() -> NowFn {
    Arc::new(|| chrono::Utc::now().timestamp())
}

/// First instant of the local calendar month `months_back` months before
/// the month containing `now`. `months_back = 0` is the current month.
///
/// Returns `None` only for timestamps the local calendar cannot represent.
pub(crate) fn local_month_start(now: i64, months_back: i32) -> Option<i64> {
    let dt = Local.timestamp_opt(now, 0).single()?;
    let total = dt.year() * 12 + dt.month0() as i32 - months_back;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12) as u32);
    Local
        .with_ymd_and_hms(year, month0 + 1, 1, 0, 0, 0)
        .earliest()
        .map(|d| d.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_start_of_current_month() {
        let now = Local
            .with_ymd_and_hms(2024, 3, 15, 13, 37, 42)
            .unwrap()
            .timestamp();
        let expected = Local
            .with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
            .unwrap()
            .timestamp();
        assert_eq!(local_month_start(now, 0), Some(expected));
    }

    #[test]
    fn test_month_start_borrows_across_year() {
        let now = Local
            .with_ymd_and_hms(2024, 1, 10, 8, 0, 0)
            .unwrap()
            .timestamp();
        let expected = Local
            .with_ymd_and_hms(2023, 11, 1, 0, 0, 0)
            .unwrap()
            .timestamp();
        assert_eq!(local_month_start(now, 2), Some(expected));
    }
}
