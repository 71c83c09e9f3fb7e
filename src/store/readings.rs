//! Append-only reading storage and energy queries.

use crate::config::HubConfig;
use crate::store::connection::ConnectionManager;
use crate::store::labels::LabelRegistry;
use crate::store::{local_month_start, system_now_fn, NowFn};
use rusqlite::params;
use std::sync::Arc;

/// Raw reading appends plus the read-side queries the publisher needs.
pub struct ReadingStore {
    conn: ConnectionManager,
    labels: Arc<LabelRegistry>,
    monthly_reset: bool,
    now_fn: NowFn,
}

impl ReadingStore {
    pub fn new(conn: ConnectionManager, labels: Arc<LabelRegistry>, cfg: &HubConfig) -> Self {
        Self::with_now_fn(conn, labels, cfg, system_now_fn())
    }

    /// Like [`ReadingStore::new`] with an injected clock, for tests.
    pub fn with_now_fn(
        conn: ConnectionManager,
        labels: Arc<LabelRegistry>,
        cfg: &HubConfig,
        now_fn: NowFn,
    ) -> Self {
        Self {
            conn,
            labels,
            monthly_reset: cfg.energy_monthly_reset,
            now_fn,
        }
    }

    /// Append one reading, resolving the label inside the same transaction.
    ///
    /// Best-effort: a store failure that survives the retry ceiling is
    /// logged and dropped, never surfaced to the ingesting caller. Losing
    /// data under sustained storage failure is the accepted trade; the logs
    /// are the record of it.
    pub fn log_reading(&self, label: &str, value: f64, timestamp: Option<i64>) {
        let ts = timestamp.unwrap_or_else(|| (self.now_fn)());

        let result = self.conn.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let label_id = self.labels.get_or_create(&tx, label)?;
            tx.execute(
                "INSERT INTO readings(label_id, timestamp, value) VALUES (?1, ?2, ?3)",
                params![label_id, ts, value],
            )?;
            tx.commit()?;
            Ok(label_id)
        });

        match result {
            Ok(label_id) => log::debug!("Inserted reading: {} ({}), {}", label, label_id, value),
            Err(e) => log::error!("❌ Failed to log reading for label '{}': {}", label, e),
        }
    }

    /// All known labels, lexicographically sorted.
    ///
    /// Errors are absorbed to an empty list; startup discovery must not
    /// fail the caller.
    pub fn get_all_labels(&self) -> Vec<String> {
        let result = self.conn.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT label FROM labels ORDER BY label ASC")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()
        });

        match result {
            Ok(labels) => labels,
            Err(e) => {
                log::error!("Failed to fetch labels: {}", e);
                Vec::new()
            }
        }
    }

    /// Sum of derived hourly energy, in kWh.
    ///
    /// With the monthly reset flag set, only hours since the first instant
    /// of the current local month count. Errors are absorbed to 0.0.
    pub fn get_total_energy(&self) -> f64 {
        let period_start = if self.monthly_reset {
            local_month_start((self.now_fn)(), 0)
        } else {
            None
        };

        let result = self.conn.with_conn(|conn| match period_start {
            Some(start) => conn.query_row(
                "SELECT SUM(kwh) FROM energy_hourly WHERE hour_start >= ?1",
                [start],
                |row| row.get::<_, Option<f64>>(0),
            ),
            None => conn.query_row("SELECT SUM(kwh) FROM energy_hourly", [], |row| {
                row.get::<_, Option<f64>>(0)
            }),
        });

        match result {
            Ok(sum) => sum.unwrap_or(0.0),
            Err(e) => {
                log::error!("Failed to compute total energy: {}", e);
                0.0
            }
        }
    }
}
