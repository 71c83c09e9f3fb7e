//! Hub runtime - runs the storage-and-aggregation engine.
//!
//! Opens (or creates) the store, wires the background scheduler with the
//! logging sink, and runs until interrupted. The wire-protocol listener is
//! a separate process/layer; this binary keeps the derived hourly energy
//! and the retention horizon current for an existing or growing store file.
//!
//! Usage:
//!   cargo run --release --bin hub_runtime
//!
//! Environment variables:
//!   WATTFLOW_DB_PATH          - SQLite database path (default: data/readings.db)
//!   AGGREGATE_INTERVAL_SECS   - scheduler tick interval (default: 300)
//!   AGGREGATE_LIMIT_HOURS     - per-tick aggregation cap (default: 1000)
//!   HISTORY_RETENTION_MONTHS  - retention horizon, 0 disables (default: 0)
//!   ENERGY_MONTHLY_RESET      - total-energy resets each month (default: false)
//!   POWER_FACTOR              - current-sensing power factor (default: 0.6)
//!   MAINS_VOLTAGE             - current-sensing mains voltage (default: 230)
//!   RUST_LOG                  - logging level (optional, default: info)

use dotenv::dotenv;
use std::sync::Arc;
use wattflow::scale;
use wattflow::scheduler::AggregationScheduler;
use wattflow::sink::{EnergySink, LogSink};
use wattflow::store::{
    ConnectionManager, HourlyAggregator, LabelRegistry, ReadingStore, RetentionTruncator,
};
use wattflow::HubConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("🚀 Starting wattflow hub runtime...");

    let config = HubConfig::from_env();
    log::info!("📊 Configuration:");
    log::info!("   ├─ DB path: {}", config.db_path);
    log::info!("   ├─ Tick interval: {}s", config.aggregate_interval_secs);
    log::info!("   ├─ Per-tick cap: {} hours", config.aggregate_limit_hours);
    if config.history_retention_months > 0 {
        log::info!("   └─ Retention: {} months", config.history_retention_months);
    } else {
        log::info!("   └─ Retention: disabled");
    }

    let manager = ConnectionManager::new(&config)?;
    manager.setup()?;

    let labels = Arc::new(LabelRegistry::new());
    let readings = Arc::new(ReadingStore::new(manager.clone(), labels, &config));
    let to_kw = scale::kw_fn(config.mains_voltage, config.power_factor);
    let aggregator = Arc::new(HourlyAggregator::new(manager.clone(), to_kw));
    let truncator = Arc::new(RetentionTruncator::new(manager.clone()));
    let sink: Arc<dyn EnergySink> = Arc::new(LogSink);

    let known = readings.get_all_labels();
    if !known.is_empty() {
        log::info!("🔌 {} known sensor labels", known.len());
    }

    let mut scheduler =
        AggregationScheduler::new(aggregator, truncator, readings, sink, &config);
    scheduler.start();
    log::info!("✅ Scheduler running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down...");
    scheduler.stop().await;

    Ok(())
}
