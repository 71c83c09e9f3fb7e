//! Publish seam towards the external notification layer.
//!
//! The hub core produces two event streams: one instantaneous power event
//! per accepted reading, and one running energy total per scheduler tick.
//! Wire format and delivery guarantees belong to the sink implementation
//! (MQTT, HTTP, ...), which lives outside this crate; every publish here is
//! best-effort and the caller absorbs failures.

use async_trait::async_trait;
use serde::Serialize;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Instantaneous power observation for one accepted reading.
#[derive(Debug, Clone, Serialize)]
pub struct PowerEvent {
    pub label: String,
    pub kw: f64,
    pub timestamp: i64,
}

/// Running energy total emitted once per scheduler tick.
#[derive(Debug, Clone, Serialize)]
pub struct EnergyTotal {
    pub kwh: f64,
    pub timestamp: i64,
}

/// Downstream consumer of per-reading power and aggregate energy values.
#[async_trait]
pub trait EnergySink: Send + Sync {
    async fn publish_power(&self, event: PowerEvent) -> Result<(), SinkError>;

    async fn publish_energy(&self, total: EnergyTotal) -> Result<(), SinkError>;
}

/// Sink that serializes every event to the log.
///
/// Stands in for a real publisher when none is wired, mirroring the
/// original deployment's publisher-disabled mode.
pub struct LogSink;

#[async_trait]
impl EnergySink for LogSink {
    async fn publish_power(&self, event: PowerEvent) -> Result<(), SinkError> {
        log::debug!("⚡ power {}", serde_json::to_string(&event)?);
        Ok(())
    }

    async fn publish_energy(&self, total: EnergyTotal) -> Result<(), SinkError> {
        log::info!("🔋 energy total {}", serde_json::to_string(&total)?);
        Ok(())
    }
}
