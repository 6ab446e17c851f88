//! Synthetic zone.
//!
//! Stands in for the bus driver and the climate sampler: every tick it
//! re-raises the faults currently in progress, occasionally starts a new
//! one, and drifts the climate around a set point.

use std::time::Duration;

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};
use zonvakt_core::alarm::{Alarm, DescribedFault, DeviceClass, FanStatus, DEFAULT_REPEAT_PERIOD};
use zonvakt_core::report::{ClimateReport, StateReport, TEMPERATURE_PROBES};
use zonvakt_core::zone::ZoneKey;

/// Chance per tick that a new fault starts.
const FAULT_PROBABILITY: f64 = 0.04;
/// Longest fault, in ticks.
const MAX_FAULT_TICKS: u32 = 12;
const CLIMATE_EVERY: u64 = 2;
const STATE_EVERY: u64 = 10;

#[derive(Debug)]
struct Fault {
    alarm: Alarm,
    remaining: u32,
}

/// What a producer run pushed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerSummary {
    pub ticks: u64,
    pub faults_started: u64,
    pub alarms_raised: u64,
    pub climates: u64,
    pub states: u64,
}

#[derive(Debug)]
pub struct ZoneSimulator {
    zone: String,
    rng: SmallRng,
    humidity: f32,
    temperatures: [f32; TEMPERATURE_PROBES],
    faults: Vec<Fault>,
}

impl ZoneSimulator {
    pub fn new(key: &ZoneKey, seed: u64) -> Self {
        Self {
            zone: key.full_name(),
            rng: SmallRng::seed_from_u64(seed),
            humidity: 65.0,
            temperatures: [21.0; TEMPERATURE_PROBES],
            faults: Vec::new(),
        }
    }

    /// Interval the producer ticks at. Faults are re-raised once per tick.
    pub fn tick_period() -> Duration {
        DEFAULT_REPEAT_PERIOD
    }

    /// Advances the fault scenario by one tick and returns the alarms to
    /// raise for it. The second value is the number of faults started.
    pub fn next_alarms(&mut self) -> (Vec<Alarm>, u64) {
        self.faults.retain_mut(|fault| {
            fault.remaining = fault.remaining.saturating_sub(1);
            fault.remaining > 0
        });

        let mut started = 0;
        if self.rng.random_bool(FAULT_PROBABILITY) {
            let alarm = self.random_alarm();
            if !self.faults.iter().any(|f| f.alarm.reason() == alarm.reason()) {
                debug!(reason = %alarm.reason(), "fault starts");
                let remaining = self.rng.random_range(1..=MAX_FAULT_TICKS);
                self.faults.push(Fault { alarm, remaining });
                started = 1;
            }
        }

        (self.faults.iter().map(|f| f.alarm.clone()).collect(), started)
    }

    fn random_alarm(&mut self) -> Alarm {
        match self.rng.random_range(0..4u8) {
            0 => {
                let index = self.rng.random_range(0..DescribedFault::ALL.len());
                Alarm::described(DescribedFault::ALL[index])
            }
            1 => Alarm::missing_device(
                "bus0",
                DeviceClass::Humidifier,
                self.rng.random_range(1..=3),
                Self::tick_period(),
            ),
            2 => {
                let status = if self.rng.random_bool(0.5) {
                    FanStatus::Aging
                } else {
                    FanStatus::Stalled
                };
                Alarm::fan("exhaust", status)
            }
            _ => Alarm::device_error(
                "bus0",
                DeviceClass::ClimateController,
                1,
                self.rng.random_range(1..=0x20),
            ),
        }
    }

    pub fn next_climate(&mut self) -> ClimateReport {
        self.humidity = (self.humidity + self.rng.random_range(-0.8..0.8)).clamp(30.0, 95.0);
        for temperature in &mut self.temperatures {
            *temperature = (*temperature + self.rng.random_range(-0.2..0.2)).clamp(15.0, 30.0);
        }
        ClimateReport::new(Utc::now(), self.humidity, self.temperatures)
    }

    pub fn state(&self) -> StateReport {
        let active: Vec<String> = self.faults.iter().map(|f| f.alarm.reason()).collect();
        StateReport::new(
            self.zone.clone(),
            Utc::now(),
            json!({
                "humidity": self.humidity,
                "temperature": self.temperatures[0],
                "active_faults": active,
            }),
        )
    }

    /// Produces for `duration`, then drops the senders. A closed receiver
    /// ends the run early.
    pub async fn run(
        mut self,
        duration: Duration,
        alarms: mpsc::Sender<Alarm>,
        climate: mpsc::Sender<ClimateReport>,
        state: mpsc::Sender<StateReport>,
    ) -> ProducerSummary {
        let mut summary = ProducerSummary::default();
        let deadline = Instant::now() + duration;
        let mut ticker = interval(Self::tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if Instant::now() >= deadline {
                break;
            }
            summary.ticks += 1;

            let (raised, started) = self.next_alarms();
            summary.faults_started += started;
            for alarm in raised {
                if alarms.send(alarm).await.is_err() {
                    return summary;
                }
                summary.alarms_raised += 1;
            }

            if summary.ticks % CLIMATE_EVERY == 0 {
                if climate.send(self.next_climate()).await.is_err() {
                    return summary;
                }
                summary.climates += 1;
            }

            if summary.ticks % STATE_EVERY == 0 {
                if state.send(self.state()).await.is_err() {
                    return summary;
                }
                summary.states += 1;
            }
        }

        info!(
            ticks = summary.ticks,
            faults = summary.faults_started,
            "zone simulation finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_scenario() {
        let key = ZoneKey::new("bench", "box");
        let mut a = ZoneSimulator::new(&key, 3);
        let mut b = ZoneSimulator::new(&key, 3);
        for _ in 0..200 {
            assert_eq!(a.next_alarms(), b.next_alarms());
            assert_eq!(a.next_climate().humidity, b.next_climate().humidity);
        }
    }

    #[test]
    fn faults_are_re_raised_until_they_end() {
        let mut simulator = ZoneSimulator::new(&ZoneKey::new("bench", "box"), 11);
        let mut seen_fault = false;
        for _ in 0..500 {
            let (raised, _) = simulator.next_alarms();
            let mut reasons: Vec<String> = raised.iter().map(Alarm::reason).collect();
            let count = reasons.len();
            reasons.dedup();
            assert_eq!(reasons.len(), count, "one raise per fault per tick");
            seen_fault |= !raised.is_empty();
        }
        assert!(seen_fault);
    }

    #[test]
    fn climate_stays_in_range() {
        let mut simulator = ZoneSimulator::new(&ZoneKey::new("bench", "box"), 5);
        for _ in 0..1000 {
            let report = simulator.next_climate();
            assert!((30.0..=95.0).contains(&report.humidity));
            assert!(report.temperatures.iter().all(|t| (15.0..=30.0).contains(t)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_at_deadline_and_closes_channels() {
        let simulator = ZoneSimulator::new(&ZoneKey::new("bench", "box"), 1);
        let (alarm_tx, mut alarm_rx) = mpsc::channel(1024);
        let (climate_tx, mut climate_rx) = mpsc::channel(1024);
        let (state_tx, mut state_rx) = mpsc::channel(1024);

        let summary = simulator
            .run(Duration::from_secs(10), alarm_tx, climate_tx, state_tx)
            .await;

        // First tick is immediate; the deadline tick is not counted.
        assert_eq!(summary.ticks, 20);
        assert_eq!(summary.climates, 10);
        assert_eq!(summary.states, 2);

        let mut climates = 0;
        while climate_rx.recv().await.is_some() {
            climates += 1;
        }
        assert_eq!(climates, 10);
        let mut alarms = 0;
        while alarm_rx.recv().await.is_some() {
            alarms += 1;
        }
        assert_eq!(alarms, summary.alarms_raised);
        assert_eq!(state_rx.recv().await.unwrap().zone, "bench/zone/box");
    }
}
