//! Shared-connection access to the embedded store.

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tables and indices, created idempotently on startup.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS labels (
    label_id INTEGER PRIMARY KEY AUTOINCREMENT,
    label    TEXT UNIQUE
);
CREATE TABLE IF NOT EXISTS readings (
    label_id  INTEGER,
    timestamp INTEGER,
    value     REAL,
    FOREIGN KEY(label_id) REFERENCES labels(label_id)
);
CREATE TABLE IF NOT EXISTS energy_hourly (
    hour_start INTEGER PRIMARY KEY,
    kwh        REAL
);
CREATE INDEX IF NOT EXISTS idx_labels_label_index ON labels(label);
CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp);
CREATE INDEX IF NOT EXISTS idx_readings_label_id ON readings(label_id);
CREATE INDEX IF NOT EXISTS idx_readings_label_id_timestamp ON readings(label_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_energy_hourly_hour ON energy_hourly(hour_start);
"#;

/// Serialized, retrying access to the single shared SQLite connection.
///
/// Exactly one logical connection exists per store file. Every operation
/// runs inside the mutex, so the synchronous ingestion path and the
/// background scheduler never overlap on the single-writer store. The
/// connection is opened lazily and discarded whenever an operation fails,
/// so the next attempt starts from a fresh handle.
#[derive(Clone)]
pub struct ConnectionManager {
    db_path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
    busy_timeout: Duration,
    retries: u32,
    retry_delay: Duration,
}

impl ConnectionManager {
    /// Create a manager for the configured store file.
    ///
    /// The parent directory is created if missing; the connection itself is
    /// not opened until first use.
    pub fn new(cfg: &HubConfig) -> Result<Self> {
        let db_path = PathBuf::from(&cfg.db_path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                log::info!("Creating database directory: {}", parent.display());
                std::fs::create_dir_all(parent).map_err(|e| {
                    HubError::FatalStore(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        log::info!("Database initialized at path: {}", db_path.display());

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(None)),
            busy_timeout: Duration::from_millis(cfg.sqlite_timeout_ms),
            retries: cfg.sqlite_retries.max(1),
            retry_delay: Duration::from_millis(cfg.sqlite_retry_delay_ms),
        })
    }

    /// Create tables and indices if absent. Safe to call on every startup.
    pub fn setup(&self) -> Result<()> {
        if self.db_path.exists() {
            log::debug!("Using existing database: {}", self.db_path.display());
        } else {
            log::info!("Creating new database: {}", self.db_path.display());
        }

        self.with_conn(|conn| conn.execute_batch(SCHEMA))?;
        log::debug!("Database setup complete");
        Ok(())
    }

    /// Run one store operation on the shared connection.
    ///
    /// Locks the connection, opening it lazily, and executes `op` inside the
    /// critical section. On failure the handle is discarded; a transient
    /// failure (SQLITE_BUSY / SQLITE_LOCKED) sleeps the fixed delay and
    /// retries up to the configured ceiling, after which it surfaces as
    /// fatal. Non-transient failures surface immediately.
    ///
    /// `op` may run more than once, so it must be safe to repeat; callers
    /// wrap multi-statement work in a transaction for exactly that reason.
    pub fn with_conn<T>(&self, op: impl Fn(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut last_err = HubError::FatalStore("store never attempted".to_string());

        for attempt in 1..=self.retries {
            match self.try_once(&op) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    log::warn!(
                        "⚠️  store access failed (attempt {}/{}): {}",
                        attempt,
                        self.retries,
                        err
                    );
                    if !err.is_transient() {
                        return Err(err);
                    }
                    last_err = err;
                    if attempt < self.retries {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        Err(HubError::FatalStore(format!(
            "could not acquire store connection after {} attempts: {}",
            self.retries, last_err
        )))
    }

    fn try_once<T>(&self, op: &impl Fn(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().unwrap();

        if guard.is_none() {
            *guard = Some(self.open()?);
        }

        let conn = guard.as_ref().unwrap();
        match op(conn) {
            Ok(value) => Ok(value),
            Err(e) => {
                // Discard the handle; the next attempt reopens from scratch.
                *guard = None;
                Err(HubError::from(e))
            }
        }
    }

    /// Open the store in its durable configuration: write-ahead logging with
    /// a bounded busy wait, so contention surfaces as an error, never a hang.
    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}
