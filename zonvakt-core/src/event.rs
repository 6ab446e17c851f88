//! On/off transitions derived from raw alarms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::{Alarm, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    On,
    Off,
}

impl AlarmStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmStatus::On => "on",
            AlarmStatus::Off => "off",
        }
    }
}

/// A zone alarm switching on or off. Only the escalation engine creates
/// these; the relay and the central service treat them as immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    /// Full name of the zone (`<host>/zone/<name>`).
    pub zone: String,
    pub alarm: Alarm,
    pub status: AlarmStatus,
    pub time: DateTime<Utc>,
}

impl AlarmEvent {
    pub fn new(zone: impl Into<String>, alarm: Alarm, status: AlarmStatus, time: DateTime<Utc>) -> Self {
        Self {
            zone: zone.into(),
            alarm,
            status,
            time,
        }
    }

    pub fn reason(&self) -> String {
        self.alarm.reason()
    }

    pub fn priority(&self) -> Priority {
        self.alarm.priority()
    }
}
