//! Hourly energy aggregation over raw readings.
//!
//! A resumable batch process over hour-aligned windows. Each fully elapsed
//! hour `[H, H+3600)` is integrated once from its raw readings into a single
//! `energy_hourly` row; re-running over an already-aggregated range changes
//! nothing. The hour containing the current instant is never touched, since
//! it may still be partially observed.

use crate::store::connection::ConnectionManager;
use crate::store::{system_now_fn, NowFn};
use crate::scale::KwFn;
use crate::error::Result;
use chrono::{Local, TimeZone};
use rusqlite::{params, Connection, OptionalExtension};

pub const HOUR_SECS: i64 = 3600;

/// Derives one kWh value per elapsed hour from raw readings.
///
/// The per-label raw-value-to-kilowatts conversion is injected; the
/// aggregator itself knows nothing about sensor protocols.
pub struct HourlyAggregator {
    conn: ConnectionManager,
    to_kw: KwFn,
    now_fn: NowFn,
}

impl HourlyAggregator {
    pub fn new(conn: ConnectionManager, to_kw: KwFn) -> Self {
        Self::with_now_fn(conn, to_kw, system_now_fn())
    }

    /// Like [`HourlyAggregator::new`] with an injected clock, for tests.
    pub fn with_now_fn(conn: ConnectionManager, to_kw: KwFn, now_fn: NowFn) -> Self {
        Self { conn, to_kw, now_fn }
    }

    /// Aggregate up to `limit_hours` past unprocessed full hours.
    ///
    /// Returns the number of hours consumed this invocation (hours skipped
    /// by the defensive idempotency check do not count). The whole
    /// invocation runs in one transaction: a failure mid-loop rolls back
    /// without a half-written hour, and re-invoking is always safe.
    pub fn aggregate_hours(&self, limit_hours: u32) -> Result<u32> {
        let now = (self.now_fn)();
        // Never aggregate the current partial hour.
        let cutoff = now - now.rem_euclid(HOUR_SECS);

        let processed = self.conn.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let Some(mut next_hour) = next_hour_to_process(&tx)? else {
                return Ok(0);
            };

            let mut processed = 0u32;
            while next_hour + HOUR_SECS <= cutoff && processed < limit_hours {
                // If an entry already exists (defensive), skip.
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM energy_hourly WHERE hour_start = ?1",
                        [next_hour],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if exists {
                    next_hour += HOUR_SECS;
                    continue;
                }

                match self.aggregate_one_hour(&tx, next_hour)? {
                    Some(kwh) => log::info!("[AGG] Hour {} => {:.5} kWh", fmt_hour(next_hour), kwh),
                    None => log::debug!("[AGG] Hour {} had no readings", fmt_hour(next_hour)),
                }

                processed += 1;
                next_hour += HOUR_SECS;
            }

            tx.commit()?;
            Ok(processed)
        })?;

        Ok(processed)
    }

    /// Integrate a single hour `[hour_start, hour_start+3600)` and upsert
    /// its row. Returns the kWh written, or `None` when the window had no
    /// readings (in which case no row is written, so a later pass can still
    /// backfill the hour if data arrives out of order).
    fn aggregate_one_hour(
        &self,
        conn: &Connection,
        hour_start: i64,
    ) -> rusqlite::Result<Option<f64>> {
        let hour_end = hour_start + HOUR_SECS;

        let mut stmt = conn.prepare(
            "SELECT readings.timestamp, labels.label, readings.value
             FROM readings
             INNER JOIN labels ON labels.label_id = readings.label_id
             WHERE readings.timestamp >= ?1 AND readings.timestamp < ?2
             ORDER BY readings.timestamp ASC",
        )?;
        let rows: Vec<(i64, f64)> = stmt
            .query_map(params![hour_start, hour_end], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(ts, label, value)| (ts, (self.to_kw)(&label, value)))
            .collect();

        if rows.is_empty() {
            return Ok(None);
        }

        // Step-hold (left-Riemann) integration: each reading's power holds
        // until the next one. Non-positive intervals contribute nothing;
        // they come from duplicate or out-of-order timestamps.
        let mut kwh_total = 0.0;
        for pair in rows.windows(2) {
            let (ts, kw) = pair[0];
            let interval = (pair[1].0 - ts).max(0);
            kwh_total += kw * interval as f64 / 3600.0;
        }

        // The last reading holds for the preceding cadence rather than being
        // truncated at the hour boundary.
        if rows.len() > 1 {
            let (last_ts, last_kw) = rows[rows.len() - 1];
            let interval = (last_ts - rows[rows.len() - 2].0).max(0);
            kwh_total += last_kw * interval as f64 / 3600.0;
        }

        conn.execute(
            "INSERT OR REPLACE INTO energy_hourly(hour_start, kwh) VALUES (?1, ?2)",
            params![hour_start, kwh_total],
        )?;
        Ok(Some(kwh_total))
    }
}

/// Epoch second of the first hour to process next, or `None` when there is
/// nothing to do.
///
/// Resumes at the hour after the last aggregated one; with no hour ever
/// aggregated, starts at the hour containing the earliest reading.
fn next_hour_to_process(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let min_ts: Option<i64> =
        conn.query_row("SELECT MIN(timestamp) FROM readings", [], |row| row.get(0))?;
    let Some(min_ts) = min_ts else {
        return Ok(None);
    };
    let first_hour = min_ts - min_ts.rem_euclid(HOUR_SECS);

    let last_hour_done: Option<i64> =
        conn.query_row("SELECT MAX(hour_start) FROM energy_hourly", [], |row| {
            row.get(0)
        })?;

    Ok(Some(match last_hour_done {
        Some(last) => last + HOUR_SECS,
        None => first_hour,
    }))
}

fn fmt_hour(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
