//! Background loop driving aggregation, retention and publishing.

use crate::config::HubConfig;
use crate::sink::{EnergySink, EnergyTotal};
use crate::store::{
    system_now_fn, HourlyAggregator, NowFn, ReadingStore, RetentionTruncator,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

/// Truncation runs at most once per day, not on every tick.
const TRUNCATION_PERIOD_SECS: i64 = 86_400;

/// Bound on how long `stop()` waits for the loop to exit.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Single background loop that periodically aggregates elapsed hours,
/// enforces retention, and forwards the running total to the sink.
///
/// Every tick failure is logged and absorbed; only [`stop`] ends the loop.
///
/// [`stop`]: AggregationScheduler::stop
pub struct AggregationScheduler {
    worker: Worker,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

/// The clonable state the background task runs on.
#[derive(Clone)]
struct Worker {
    aggregator: Arc<HourlyAggregator>,
    truncator: Arc<RetentionTruncator>,
    readings: Arc<ReadingStore>,
    sink: Arc<dyn EnergySink>,
    interval: Duration,
    retention_months: i32,
    limit_hours: u32,
    now_fn: NowFn,
}

impl AggregationScheduler {
    pub fn new(
        aggregator: Arc<HourlyAggregator>,
        truncator: Arc<RetentionTruncator>,
        readings: Arc<ReadingStore>,
        sink: Arc<dyn EnergySink>,
        cfg: &HubConfig,
    ) -> Self {
        Self::with_now_fn(aggregator, truncator, readings, sink, cfg, system_now_fn())
    }

    /// Like [`AggregationScheduler::new`] with an injected clock, for tests.
    pub fn with_now_fn(
        aggregator: Arc<HourlyAggregator>,
        truncator: Arc<RetentionTruncator>,
        readings: Arc<ReadingStore>,
        sink: Arc<dyn EnergySink>,
        cfg: &HubConfig,
        now_fn: NowFn,
    ) -> Self {
        Self {
            worker: Worker {
                aggregator,
                truncator,
                readings,
                sink,
                interval: Duration::from_secs(cfg.aggregate_interval_secs),
                retention_months: cfg.history_retention_months,
                limit_hours: cfg.aggregate_limit_hours,
                now_fn,
            },
            stop_tx: None,
            handle: None,
        }
    }

    /// Start the background loop.
    ///
    /// Idempotent: a second call while the loop is alive is a no-op.
    pub fn start(&mut self) {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                log::debug!("Aggregation scheduler already running");
                return;
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = self.worker.clone();
        self.handle = Some(tokio::spawn(worker.run(stop_rx)));
        self.stop_tx = Some(stop_tx);
    }

    /// Signal the loop to stop and wait, bounded, for it to exit.
    ///
    /// The inter-tick wait races against this signal, so shutdown latency
    /// is small compared to the tick interval.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if timeout(STOP_JOIN_TIMEOUT, handle).await.is_err() {
                log::warn!(
                    "⚠️  Aggregation scheduler did not stop within {:?}",
                    STOP_JOIN_TIMEOUT
                );
            }
        }
    }
}

impl Worker {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        log::info!(
            "⏰ Aggregation scheduler started (interval: {}s)",
            self.interval.as_secs()
        );

        let mut last_truncation: i64 = 0;
        loop {
            self.tick(&mut last_truncation).await;

            // Sleep with wake-up on the stop signal.
            tokio::select! {
                _ = sleep(self.interval) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Aggregation scheduler stopped");
    }

    async fn tick(&self, last_truncation: &mut i64) {
        let now = (self.now_fn)();

        if self.retention_months > 0 && now - *last_truncation >= TRUNCATION_PERIOD_SECS {
            // Attempt time recorded regardless of outcome, so a failing
            // truncation retries daily instead of every tick.
            *last_truncation = now;
            match self.truncator.truncate(self.retention_months) {
                Ok(deleted) => log::debug!("Retention pass removed {} rows", deleted),
                Err(e) => log::error!("❌ Retention truncation failed: {}", e),
            }
        }

        match self.aggregator.aggregate_hours(self.limit_hours) {
            Ok(processed) => log::debug!("Aggregator processed {} hours", processed),
            Err(e) => log::error!("❌ Aggregation failed: {}", e),
        }

        let total = EnergyTotal {
            kwh: self.readings.get_total_energy(),
            timestamp: now,
        };
        if let Err(e) = self.sink.publish_energy(total).await {
            log::warn!("⚠️  Energy total not published: {}", e);
        }
    }
}
