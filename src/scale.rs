//! Per-protocol power conversion rules.
//!
//! Sensor labels carry a composite identity of the form
//! `<proto>_<version>_<sensorid>` (e.g. `efergy_h1_v1.0.1_548338`,
//! `efergy_h2_123456`). The leading protocol tag decides how a raw reading
//! maps to instantaneous kilowatts:
//!
//! - `efergy_h1` / `efergy_h2`: clamp-meter current in milliamps, derated by
//!   the configured power factor at mains voltage
//! - `efergy_h3`: pre-scaled decawatt values
//! - anything else: plain watts
//!
//! The aggregator and the ingest path receive the conversion as an injected
//! [`KwFn`] rather than reading these rules themselves, so deployments with
//! other sensor families can swap the mapping without touching the engine.

use std::sync::Arc;

/// Sensor protocol parsed from the leading tag of a composite label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    H1,
    H2,
    H3,
    Other,
}

impl Protocol {
    /// Parse the protocol tag from a composite label.
    ///
    /// Unknown or malformed labels fall back to [`Protocol::Other`], which
    /// treats the raw value as watts.
    pub fn of_label(label: &str) -> Protocol {
        let mut parts = label.splitn(3, '_');
        match (parts.next(), parts.next()) {
            (Some("efergy"), Some("h1")) => Protocol::H1,
            (Some("efergy"), Some("h2")) => Protocol::H2,
            (Some("efergy"), Some("h3")) => Protocol::H3,
            _ => Protocol::Other,
        }
    }
}

/// Conversion from one raw sensor value to instantaneous kilowatts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerScale {
    /// Clamp-meter current in milliamps at mains voltage, derated by the
    /// power factor.
    CurrentSensing {
        mains_voltage: f64,
        power_factor: f64,
    },

    /// Raw value in decawatts.
    Decawatt,

    /// Raw value in watts.
    Watt,
}

impl PowerScale {
    /// Scale rule for a protocol, given the deployment's electrical constants.
    pub fn for_protocol(proto: Protocol, mains_voltage: f64, power_factor: f64) -> PowerScale {
        match proto {
            Protocol::H1 | Protocol::H2 => PowerScale::CurrentSensing {
                mains_voltage,
                power_factor,
            },
            Protocol::H3 => PowerScale::Decawatt,
            Protocol::Other => PowerScale::Watt,
        }
    }

    /// Convert a raw reading to kilowatts.
    pub fn to_kilowatts(self, raw: f64) -> f64 {
        match self {
            PowerScale::CurrentSensing {
                mains_voltage,
                power_factor,
            } => (power_factor * mains_voltage * (raw / 1000.0)) / 1000.0,
            PowerScale::Decawatt => (raw / 10.0) / 1000.0,
            PowerScale::Watt => raw / 1000.0,
        }
    }
}

/// Injected label-to-kilowatts conversion.
pub type KwFn = Arc<dyn Fn(&str, f64) -> f64 + Send + Sync>;

/// Build the stock conversion for the efergy label family.
pub fn kw_fn(mains_voltage: f64, power_factor: f64) -> KwFn {
    Arc::new(move |label, raw| {
        PowerScale::for_protocol(Protocol::of_label(label), mains_voltage, power_factor)
            .to_kilowatts(raw)
    })
}
