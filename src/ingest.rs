//! Ingestion boundary for canonical sensor tuples.
//!
//! The wire-protocol listener (outside this crate) decodes vendor payloads
//! into `(label, raw value, timestamp)` tuples and hands them here. This is
//! the one synchronous write path into the store, and it is best-effort all
//! the way down: malformed input is rejected and logged, store failures are
//! absorbed after the retry ceiling, sink failures are absorbed outright.
//! Nothing propagates back into the protocol layer.

use crate::error::{HubError, Result};
use crate::scale::KwFn;
use crate::sink::{EnergySink, PowerEvent};
use crate::store::{system_now_fn, NowFn, ReadingStore};
use std::sync::Arc;

pub struct SensorIngest {
    readings: Arc<ReadingStore>,
    to_kw: KwFn,
    sink: Arc<dyn EnergySink>,
    now_fn: NowFn,
}

impl SensorIngest {
    pub fn new(readings: Arc<ReadingStore>, to_kw: KwFn, sink: Arc<dyn EnergySink>) -> Self {
        Self::with_now_fn(readings, to_kw, sink, system_now_fn())
    }

    /// Like [`SensorIngest::new`] with an injected clock, for tests.
    pub fn with_now_fn(
        readings: Arc<ReadingStore>,
        to_kw: KwFn,
        sink: Arc<dyn EnergySink>,
        now_fn: NowFn,
    ) -> Self {
        Self {
            readings,
            to_kw,
            sink,
            now_fn,
        }
    }

    /// Accept one reading from the protocol layer.
    ///
    /// Persists the raw value (timestamp defaults to ingestion time) and
    /// publishes the converted instantaneous power for the label.
    pub async fn ingest(&self, label: &str, value: f64, timestamp: Option<i64>) {
        if let Err(e) = validate(label, value) {
            log::warn!("⚠️  Rejected reading for '{}': {}", label, e);
            return;
        }

        let ts = timestamp.unwrap_or_else(|| (self.now_fn)());
        self.readings.log_reading(label, value, Some(ts));

        let event = PowerEvent {
            label: label.to_string(),
            kw: (self.to_kw)(label, value),
            timestamp: ts,
        };
        if let Err(e) = self.sink.publish_power(event).await {
            log::debug!("⚠️  Power event not published ({}): {}", label, e);
        }
    }
}

fn validate(label: &str, value: f64) -> Result<()> {
    if label.trim().is_empty() {
        return Err(HubError::Data("empty label".to_string()));
    }
    if !value.is_finite() {
        return Err(HubError::Data(format!("non-finite value {value}")));
    }
    Ok(())
}
