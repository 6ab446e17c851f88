//! Climate and state telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::AlarmEvent;

/// Number of independent temperature probes in a zone.
pub const TEMPERATURE_PROBES: usize = 4;

/// A single climate sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateReport {
    pub time: DateTime<Utc>,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Probe temperatures in °C. The first one is the zone's reference.
    pub temperatures: [f32; TEMPERATURE_PROBES],
}

impl ClimateReport {
    pub fn new(time: DateTime<Utc>, humidity: f32, temperatures: [f32; TEMPERATURE_PROBES]) -> Self {
        Self {
            time,
            humidity,
            temperatures,
        }
    }

    pub fn reference_temperature(&self) -> f32 {
        self.temperatures[0]
    }
}

/// Wire form of a climate sample, tagged with the zone it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedClimateReport {
    pub zone: String,
    #[serde(flatten)]
    pub report: ClimateReport,
}

impl NamedClimateReport {
    pub fn new(zone: impl Into<String>, report: ClimateReport) -> Self {
        Self {
            zone: zone.into(),
            report,
        }
    }
}

/// Snapshot of a zone's controller state. The pipeline never looks inside
/// `snapshot`; it is forwarded as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReport {
    pub zone: String,
    pub time: DateTime<Utc>,
    pub snapshot: serde_json::Value,
}

impl StateReport {
    pub fn new(zone: impl Into<String>, time: DateTime<Utc>, snapshot: serde_json::Value) -> Self {
        Self {
            zone: zone.into(),
            time,
            snapshot,
        }
    }
}

/// Slice of persisted history sent while catching up after a reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub zone: String,
    pub alarms: Vec<AlarmEvent>,
    pub climates: Vec<ClimateReport>,
    /// Set on the final batch of a replay.
    pub last: bool,
}
