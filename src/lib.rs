//! wattflow - durable power-sensor storage and hourly energy aggregation.
//!
//! Ingests periodic power-sensor readings into an embedded SQLite store and
//! derives one energy value per elapsed hour through a causal, idempotent,
//! time-weighted aggregation, with a rolling retention horizon on top.
//!
//! ## Architecture
//!
//! ```text
//! (label, value, ts)                ┌─ background task ─────────────┐
//!     ↓                            │  AggregationScheduler         │
//! SensorIngest ──→ ReadingStore    │    ├─ RetentionTruncator      │
//!     │                ↓           │    ├─ HourlyAggregator        │
//!     │          ConnectionManager ←───┘└─ total → EnergySink      │
//!     └─ power event → EnergySink  └───────────────────────────────┘
//! ```
//!
//! The wire-protocol listener that produces the canonical tuples and the
//! real publish sink (MQTT, ...) live outside this crate; `SensorIngest`
//! and [`sink::EnergySink`] are the seams they plug into.

pub mod config;
pub mod error;
pub mod ingest;
pub mod scale;
pub mod scheduler;
pub mod sink;
pub mod store;

pub use config::HubConfig;
pub use error::{HubError, Result};
