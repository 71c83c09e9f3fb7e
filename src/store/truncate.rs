//! Rolling retention horizon.

use crate::error::{HubError, Result};
use crate::store::connection::ConnectionManager;
use crate::store::{local_month_start, system_now_fn, NowFn};
use chrono::{Local, TimeZone};

/// Deletes raw readings and derived hourly rows older than the configured
/// horizon. Labels are never pruned; orphaned labels stay behind so ids
/// remain stable for sensors that go quiet and come back.
pub struct RetentionTruncator {
    conn: ConnectionManager,
    now_fn: NowFn,
}

impl RetentionTruncator {
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_now_fn(conn, system_now_fn())
    }

    /// Like [`RetentionTruncator::new`] with an injected clock, for tests.
    pub fn with_now_fn(conn: ConnectionManager, now_fn: NowFn) -> Self {
        Self { conn, now_fn }
    }

    /// Delete rows older than the retention horizon.
    ///
    /// The cutoff is the first instant of the local calendar month
    /// `retention_months` months before the current month, so a horizon of
    /// one month mid-March keeps everything since February 1st. Returns the
    /// total rows removed; a no-op when `retention_months <= 0`.
    pub fn truncate(&self, retention_months: i32) -> Result<usize> {
        if retention_months <= 0 {
            return Ok(0);
        }

        let now = (self.now_fn)();
        let cutoff = local_month_start(now, retention_months).ok_or_else(|| {
            HubError::Logic(format!("unrepresentable retention cutoff for now={now}"))
        })?;

        let deleted = self.conn.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut deleted =
                tx.execute("DELETE FROM readings WHERE timestamp < ?1", [cutoff])?;
            deleted += tx.execute("DELETE FROM energy_hourly WHERE hour_start < ?1", [cutoff])?;
            tx.commit()?;

            // Give the space released by the deletes back to the filesystem.
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
            Ok(deleted)
        })?;

        if deleted > 0 {
            log::info!(
                "🧹 Truncated {} old records (older than {})",
                deleted,
                fmt_cutoff(cutoff)
            );
        }
        Ok(deleted)
    }
}

fn fmt_cutoff(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}
