//! Fault conditions raised by the bus driver.
//!
//! An [`Alarm`] is raised again on every poll cycle for as long as the
//! condition persists. Its [`Alarm::reason`] is the dedup key the escalation
//! engine groups occurrences by, so it must render identically for the same
//! condition and differently for unrelated ones.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Repeat period of described and fan faults.
pub const DEFAULT_REPEAT_PERIOD: Duration = Duration::from_millis(500);

/// Heartbeat interval devices are polled at on the bus.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Lowest and highest device id addressable on a bus.
pub const MIN_DEVICE_ID: u8 = 1;
pub const MAX_DEVICE_ID: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Warning,
    Emergency,
}

impl Priority {
    /// Operator-facing severity level.
    pub fn level(self) -> u8 {
        match self {
            Priority::Warning => 1,
            Priority::Emergency => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Warning => f.write_str("warning"),
            Priority::Emergency => f.write_str("emergency"),
        }
    }
}

/// Kind of device attached to a zone's bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    ClimateController,
    Humidifier,
    LightController,
}

impl DeviceClass {
    pub fn name(self) -> &'static str {
        match self {
            DeviceClass::ClimateController => "ClimateController",
            DeviceClass::Humidifier => "Humidifier",
            DeviceClass::LightController => "LightController",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanStatus {
    Ok,
    Aging,
    Stalled,
}

/// Catalogue of faults described by a fixed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescribedFault {
    WaterLevelWarning,
    WaterLevelCritical,
    WaterLevelUnreadable,
    HumidityUnreachable,
    TemperatureUnreachable,
    HumidityOutOfBound,
    TemperatureOutOfBound,
    SensorReadoutIssue,
}

impl DescribedFault {
    pub const ALL: [DescribedFault; 8] = [
        DescribedFault::WaterLevelWarning,
        DescribedFault::WaterLevelCritical,
        DescribedFault::WaterLevelUnreadable,
        DescribedFault::HumidityUnreachable,
        DescribedFault::TemperatureUnreachable,
        DescribedFault::HumidityOutOfBound,
        DescribedFault::TemperatureOutOfBound,
        DescribedFault::SensorReadoutIssue,
    ];

    pub fn message(self) -> &'static str {
        match self {
            DescribedFault::WaterLevelWarning => "Humidifier water level is low",
            DescribedFault::WaterLevelCritical => "Humidifier tank is empty",
            DescribedFault::WaterLevelUnreadable => "Humidifier water level is unreadable",
            DescribedFault::HumidityUnreachable => "Cannot reach desired humidity",
            DescribedFault::TemperatureUnreachable => "Cannot reach desired temperature",
            DescribedFault::HumidityOutOfBound => "Humidity is outside of boundaries",
            DescribedFault::TemperatureOutOfBound => "Temperature is outside of boundaries",
            DescribedFault::SensorReadoutIssue => "Cannot read sensors",
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            DescribedFault::WaterLevelWarning
            | DescribedFault::HumidityUnreachable
            | DescribedFault::TemperatureUnreachable => Priority::Warning,
            DescribedFault::WaterLevelCritical
            | DescribedFault::WaterLevelUnreadable
            | DescribedFault::HumidityOutOfBound
            | DescribedFault::TemperatureOutOfBound
            | DescribedFault::SensorReadoutIssue => Priority::Emergency,
        }
    }
}

/// A single raised fault condition.
///
/// Build the keyed variants through [`Alarm::missing_device`],
/// [`Alarm::fan`] and [`Alarm::device_error`] so their fields are normalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alarm {
    Described {
        fault: DescribedFault,
    },
    MissingDevice {
        bus: String,
        class: DeviceClass,
        id: u8,
        #[serde(with = "duration_ms")]
        heartbeat: Duration,
    },
    Fan {
        fan: String,
        status: FanStatus,
    },
    DeviceError {
        bus: String,
        class: DeviceClass,
        id: u8,
        code: u16,
    },
}

impl Alarm {
    pub fn described(fault: DescribedFault) -> Self {
        Alarm::Described { fault }
    }

    /// Device that stopped answering heartbeats. `heartbeat` is the bus
    /// polling interval and doubles as the repeat period.
    pub fn missing_device(
        bus: impl Into<String>,
        class: DeviceClass,
        id: u8,
        heartbeat: Duration,
    ) -> Self {
        Alarm::MissingDevice {
            bus: bus.into(),
            class,
            id: id.clamp(MIN_DEVICE_ID, MAX_DEVICE_ID),
            heartbeat,
        }
    }

    /// A fan reporting a problem. An `Ok` status is reported as aging: the
    /// driver only raises fan alarms when something is wrong.
    pub fn fan(fan: impl Into<String>, status: FanStatus) -> Self {
        let status = match status {
            FanStatus::Ok => FanStatus::Aging,
            other => other,
        };
        Alarm::Fan {
            fan: fan.into(),
            status,
        }
    }

    pub fn device_error(bus: impl Into<String>, class: DeviceClass, id: u8, code: u16) -> Self {
        Alarm::DeviceError {
            bus: bus.into(),
            class,
            id: id.clamp(MIN_DEVICE_ID, MAX_DEVICE_ID),
            code,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Alarm::Described { fault } => fault.priority(),
            Alarm::MissingDevice { .. } | Alarm::DeviceError { .. } => Priority::Emergency,
            Alarm::Fan { status, .. } => match status {
                FanStatus::Stalled => Priority::Emergency,
                FanStatus::Ok | FanStatus::Aging => Priority::Warning,
            },
        }
    }

    /// Dedup key of the condition.
    pub fn reason(&self) -> String {
        match self {
            Alarm::Described { fault } => fault.message().to_string(),
            Alarm::MissingDevice { bus, class, id, .. } => {
                format!("Device {}.{}.{} is missing", bus, class.name(), id)
            }
            Alarm::Fan { fan, status } => {
                let status = match status {
                    FanStatus::Stalled => "stalled",
                    FanStatus::Ok | FanStatus::Aging => "aging",
                };
                format!("Fan {} is {}", fan, status)
            }
            Alarm::DeviceError {
                bus,
                class,
                id,
                code,
            } => format!(
                "Device {}.{}.{} internal error {:#06x}",
                bus,
                class.name(),
                id,
                code
            ),
        }
    }

    /// Interval at which the driver re-raises the alarm while it persists.
    pub fn repeat_period(&self) -> Duration {
        match self {
            Alarm::MissingDevice { heartbeat, .. } => *heartbeat,
            Alarm::Described { .. } | Alarm::Fan { .. } | Alarm::DeviceError { .. } => {
                DEFAULT_REPEAT_PERIOD
            }
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn catalogue_reasons_are_distinct() {
        let reasons: HashSet<_> = DescribedFault::ALL
            .iter()
            .map(|f| Alarm::described(*f).reason())
            .collect();
        assert_eq!(reasons.len(), DescribedFault::ALL.len());
    }

    #[test]
    fn missing_device_clamps_id() {
        let low = Alarm::missing_device("can0", DeviceClass::Humidifier, 0, DEFAULT_HEARTBEAT_PERIOD);
        let high = Alarm::missing_device("can0", DeviceClass::Humidifier, 42, DEFAULT_HEARTBEAT_PERIOD);
        assert_eq!(low.reason(), "Device can0.Humidifier.1 is missing");
        assert_eq!(high.reason(), "Device can0.Humidifier.7 is missing");
        assert_eq!(low.priority(), Priority::Emergency);
    }

    #[test]
    fn missing_device_period_is_heartbeat() {
        let alarm = Alarm::missing_device(
            "can1",
            DeviceClass::ClimateController,
            1,
            Duration::from_millis(250),
        );
        assert_eq!(alarm.repeat_period(), Duration::from_millis(250));
    }

    #[test]
    fn fan_ok_status_is_reported_as_aging() {
        let alarm = Alarm::fan("wind-1", FanStatus::Ok);
        assert_eq!(alarm, Alarm::fan("wind-1", FanStatus::Aging));
        assert_eq!(alarm.reason(), "Fan wind-1 is aging");
        assert_eq!(alarm.priority(), Priority::Warning);
        assert_eq!(alarm.repeat_period(), DEFAULT_REPEAT_PERIOD);
    }

    #[test]
    fn stalled_fan_is_an_emergency() {
        let alarm = Alarm::fan("wind-1", FanStatus::Stalled);
        assert_eq!(alarm.priority(), Priority::Emergency);
        assert_eq!(alarm.reason(), "Fan wind-1 is stalled");
    }

    #[test]
    fn device_error_reason_carries_code() {
        let alarm = Alarm::device_error("can0", DeviceClass::LightController, 3, 0x42);
        assert_eq!(
            alarm.reason(),
            "Device can0.LightController.3 internal error 0x0042"
        );
    }

    #[test]
    fn priority_levels() {
        assert_eq!(Priority::Warning.level(), 1);
        assert_eq!(Priority::Emergency.level(), 2);
    }

    #[test]
    fn alarm_survives_json() {
        let alarm = Alarm::missing_device(
            "can0",
            DeviceClass::ClimateController,
            2,
            Duration::from_millis(1500),
        );
        let json = serde_json::to_string(&alarm).unwrap();
        assert!(json.contains("\"kind\":\"missing_device\""));
        let back: Alarm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alarm);
    }

    fn device_class() -> impl Strategy<Value = DeviceClass> {
        prop_oneof![
            Just(DeviceClass::ClimateController),
            Just(DeviceClass::Humidifier),
            Just(DeviceClass::LightController),
        ]
    }

    fn fan_status() -> impl Strategy<Value = FanStatus> {
        prop_oneof![
            Just(FanStatus::Ok),
            Just(FanStatus::Aging),
            Just(FanStatus::Stalled)
        ]
    }

    fn any_alarm() -> impl Strategy<Value = Alarm> {
        prop_oneof![
            (0..DescribedFault::ALL.len()).prop_map(|i| Alarm::described(DescribedFault::ALL[i])),
            ("[a-z]{2,4}[0-9]", device_class(), any::<u8>(), 1u64..5_000).prop_map(
                |(bus, class, id, ms)| Alarm::missing_device(bus, class, id, Duration::from_millis(ms))
            ),
            ("[a-z-]{1,8}[0-9]?", fan_status()).prop_map(|(fan, status)| Alarm::fan(fan, status)),
            ("[a-z]{2,4}[0-9]", device_class(), any::<u8>(), any::<u16>())
                .prop_map(|(bus, class, id, code)| Alarm::device_error(bus, class, id, code)),
        ]
    }

    /// Identity of a condition, independent of how often it is raised.
    fn condition_key(alarm: &Alarm) -> Alarm {
        match alarm {
            Alarm::MissingDevice { bus, class, id, .. } => Alarm::MissingDevice {
                bus: bus.clone(),
                class: *class,
                id: *id,
                heartbeat: Duration::ZERO,
            },
            other => other.clone(),
        }
    }

    proptest! {
        #[test]
        fn reason_is_stable_for_the_same_condition(alarm in any_alarm()) {
            prop_assert_eq!(alarm.reason(), alarm.clone().reason());
        }

        #[test]
        fn reasons_collide_only_for_the_same_condition(a in any_alarm(), b in any_alarm()) {
            let same_condition = condition_key(&a) == condition_key(&b);
            prop_assert_eq!(a.reason() == b.reason(), same_condition);
        }
    }
}
