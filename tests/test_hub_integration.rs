//! End-to-end tests for the storage-and-aggregation engine.
//!
//! Drives the real components over a temporary store file: ingest canonical
//! tuples, aggregate elapsed hours, query totals, truncate history, and run
//! one scheduler pass against a recording sink.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use wattflow::config::HubConfig;
use wattflow::ingest::SensorIngest;
use wattflow::scale::kw_fn;
use wattflow::scheduler::AggregationScheduler;
use wattflow::sink::{EnergySink, EnergyTotal, PowerEvent, SinkError};
use wattflow::store::{
    ConnectionManager, HourlyAggregator, LabelRegistry, NowFn, ReadingStore, RetentionTruncator,
};

const HOUR: i64 = 3600;
// Hour-aligned base: 2023-11-14 22:00:00 UTC.
const BASE: i64 = 1_700_000_000 - (1_700_000_000 % HOUR);

#[derive(Default)]
struct RecordingSink {
    powers: Mutex<Vec<PowerEvent>>,
    totals: Mutex<Vec<EnergyTotal>>,
}

#[async_trait]
impl EnergySink for RecordingSink {
    async fn publish_power(&self, event: PowerEvent) -> Result<(), SinkError> {
        self.powers.lock().unwrap().push(event);
        Ok(())
    }

    async fn publish_energy(&self, total: EnergyTotal) -> Result<(), SinkError> {
        self.totals.lock().unwrap().push(total);
        Ok(())
    }
}

struct Hub {
    manager: ConnectionManager,
    readings: Arc<ReadingStore>,
    sink: Arc<RecordingSink>,
    ingest: SensorIngest,
    cfg: HubConfig,
}

fn hub(dir: &tempfile::TempDir, now: i64) -> Hub {
    let cfg = HubConfig {
        db_path: dir.path().join("readings.db").to_str().unwrap().to_string(),
        ..HubConfig::default()
    };
    let manager = ConnectionManager::new(&cfg).unwrap();
    manager.setup().unwrap();

    let now_fn: NowFn = Arc::new(move || now);
    let readings = Arc::new(ReadingStore::with_now_fn(
        manager.clone(),
        Arc::new(LabelRegistry::new()),
        &cfg,
        now_fn.clone(),
    ));
    let sink = Arc::new(RecordingSink::default());
    let ingest = SensorIngest::with_now_fn(
        readings.clone(),
        kw_fn(cfg.mains_voltage, cfg.power_factor),
        sink.clone(),
        now_fn,
    );

    Hub {
        manager,
        readings,
        sink,
        ingest,
        cfg,
    }
}

fn aggregator(hub: &Hub, now: i64) -> HourlyAggregator {
    HourlyAggregator::with_now_fn(
        hub.manager.clone(),
        kw_fn(hub.cfg.mains_voltage, hub.cfg.power_factor),
        Arc::new(move || now),
    )
}

#[tokio::test]
async fn test_ingest_aggregate_total_truncate_roundtrip() {
    let dir = tempdir().unwrap();
    let hub = hub(&dir, BASE + 2 * HOUR);

    // First hour: one decawatt sensor at a 30-minute cadence.
    // 0.01 kW then 0.03 kW, half an hour each: 0.02 kWh.
    hub.ingest.ingest("efergy_h3_7", 100.0, Some(BASE)).await;
    hub.ingest.ingest("efergy_h3_7", 300.0, Some(BASE + 1800)).await;

    // Second hour: a direct-watt sensor at a 20-minute cadence.
    // (1.0 + 2.0 + 3.0) kW for 1200 s each: 2.0 kWh.
    hub.ingest.ingest("plug_shed", 1000.0, Some(BASE + HOUR)).await;
    hub.ingest.ingest("plug_shed", 2000.0, Some(BASE + HOUR + 1200)).await;
    hub.ingest.ingest("plug_shed", 3000.0, Some(BASE + HOUR + 2400)).await;

    // Every accepted reading produced a power event for its label.
    assert_eq!(hub.sink.powers.lock().unwrap().len(), 5);
    assert_eq!(
        hub.readings.get_all_labels(),
        vec!["efergy_h3_7".to_string(), "plug_shed".to_string()]
    );

    // Both elapsed hours aggregate; the rerun finds nothing pending.
    let agg = aggregator(&hub, BASE + 2 * HOUR);
    assert_eq!(agg.aggregate_hours(1000).unwrap(), 2);
    assert_eq!(agg.aggregate_hours(1000).unwrap(), 0);

    let total = hub.readings.get_total_energy();
    assert!((total - 2.02).abs() < 1e-9, "total was {total}");

    // A reading older than the horizon arrives late; it can no longer be
    // aggregated (the resume point has moved past it) and truncation
    // removes it, leaving its label in place.
    let ancient = BASE - 400 * 86_400;
    hub.ingest.ingest("efergy_h2_relic", 50.0, Some(ancient)).await;
    assert_eq!(agg.aggregate_hours(1000).unwrap(), 0);

    let truncator =
        RetentionTruncator::with_now_fn(hub.manager.clone(), Arc::new(move || BASE + 2 * HOUR));
    let deleted = truncator.truncate(12).unwrap();
    assert_eq!(deleted, 1);

    assert!((hub.readings.get_total_energy() - 2.02).abs() < 1e-9);
    assert_eq!(
        hub.readings.get_all_labels(),
        vec![
            "efergy_h2_relic".to_string(),
            "efergy_h3_7".to_string(),
            "plug_shed".to_string()
        ]
    );
}

#[tokio::test]
async fn test_scheduler_drives_engine_to_sink() {
    let dir = tempdir().unwrap();
    let hub = hub(&dir, BASE + HOUR);

    hub.ingest.ingest("efergy_h3_7", 100.0, Some(BASE)).await;
    hub.ingest.ingest("efergy_h3_7", 300.0, Some(BASE + 1800)).await;

    let aggregator = Arc::new(aggregator(&hub, BASE + HOUR));
    let truncator = Arc::new(RetentionTruncator::with_now_fn(
        hub.manager.clone(),
        Arc::new(move || BASE + HOUR),
    ));

    let mut scheduler = AggregationScheduler::with_now_fn(
        aggregator,
        truncator,
        hub.readings.clone(),
        hub.sink.clone(),
        &hub.cfg,
        Arc::new(move || BASE + HOUR),
    );

    scheduler.start();
    for _ in 0..100 {
        if !hub.sink.totals.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    scheduler.stop().await;

    let totals = hub.sink.totals.lock().unwrap();
    assert!(!totals.is_empty(), "scheduler never published a total");
    assert!((totals[0].kwh - 0.02).abs() < 1e-9, "total was {}", totals[0].kwh);
    assert_eq!(totals[0].timestamp, BASE + HOUR);
}
