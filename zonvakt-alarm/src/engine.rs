//! The escalation engine task.
//!
//! One engine runs per zone. It owns its dedup table, its expiry timers and
//! its emission backlog, and multiplexes them with the inbound alarm channel
//! in a single `select!` loop. Dropping every inbound sender is the only way
//! to stop it: pending timers and queued events are discarded and the
//! outbound channel closes.

use std::future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn, Instrument};
use zonvakt_config::AlarmConfig;
use zonvakt_core::alarm::Alarm;
use zonvakt_core::event::AlarmEvent;
use zonvakt_telemetry::{EventLogger, MetricsRecorder};

use crate::escalation::Escalator;
use crate::outbox::Outbox;
use crate::timers::ExpiryTimers;

/// Expiry fires this many repeat periods after a raise.
const EXPIRY_PERIODS: u32 = 3;
/// Stand-in deadline for a repeat period too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Point-in-time view of an engine's internal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub active_reasons: usize,
    pub pending_timers: usize,
    pub backlog: usize,
}

pub struct EngineHandle {
    status: watch::Receiver<EngineStatus>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    /// Waits for the engine to stop. It stops once every inbound sender is
    /// dropped.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}

pub struct AlarmEngine;

impl AlarmEngine {
    /// Spawns the engine of `zone` on the current runtime. Returns the raw
    /// alarm sink, the on/off event source and a handle on the task.
    pub fn spawn(
        zone: impl Into<String>,
        config: &AlarmConfig,
        metrics: MetricsRecorder,
    ) -> (mpsc::Sender<Alarm>, mpsc::Receiver<AlarmEvent>, EngineHandle) {
        let zone = zone.into();
        let (alarm_tx, alarm_rx) = mpsc::channel(config.inbound_capacity);
        let (event_tx, event_rx) = mpsc::channel(config.outbound_capacity);
        let (status_tx, status_rx) = watch::channel(EngineStatus::default());

        let span = EventLogger::zone_span("alarm", &zone);
        let outbox = Outbox::new(zone.clone(), config.backlog, metrics.clone());
        let task = tokio::spawn(
            run(
                Escalator::new(zone),
                alarm_rx,
                event_tx,
                outbox,
                metrics,
                status_tx,
            )
            .instrument(span),
        );

        (
            alarm_tx,
            event_rx,
            EngineHandle {
                status: status_rx,
                task,
            },
        )
    }
}

async fn run(
    mut escalator: Escalator,
    mut inbound: mpsc::Receiver<Alarm>,
    outbound: mpsc::Sender<AlarmEvent>,
    mut outbox: Outbox,
    metrics: MetricsRecorder,
    status: watch::Sender<EngineStatus>,
) {
    let zone = escalator.zone().to_string();
    let mut timers = ExpiryTimers::new();
    info!("alarm engine started");

    loop {
        let next_deadline = timers.next_deadline();

        tokio::select! {
            biased;

            permit = outbound.reserve(), if outbox.has_backlog() => match permit {
                Ok(permit) => {
                    if let Some(event) = outbox.pop() {
                        permit.send(event);
                    }
                }
                Err(_) => {
                    let discarded = outbox.discard();
                    debug!(discarded, "event receiver gone, backlog discarded");
                }
            },

            _ = expiry(next_deadline) => {
                for reason in timers.pop_due(Instant::now()) {
                    if let Some(event) = escalator.expire(&reason) {
                        info!(reason = %reason, priority = %event.priority(), "alarm off");
                        outbox.emit(&outbound, event);
                    }
                }
            }

            received = inbound.recv() => match received {
                Some(alarm) => {
                    metrics.inc_alarms_received(&zone);
                    let reason = alarm.reason();
                    let deadline = expiry_deadline(Instant::now(), alarm.repeat_period(), &reason);
                    timers.schedule(deadline, reason.clone());

                    if let Some(event) = escalator.raise(&reason, alarm) {
                        info!(reason = %reason, priority = %event.priority(), "alarm on");
                        outbox.emit(&outbound, event);
                    }
                }
                None => break,
            },
        }

        publish(&status, &escalator, &timers, &outbox);
    }

    let timers_dropped = timers.clear();
    let events_dropped = outbox.discard();
    info!(
        active = escalator.active_reasons(),
        timers_dropped, events_dropped, "alarm engine stopped"
    );
    status.send_replace(EngineStatus::default());
}

fn expiry_deadline(now: Instant, period: Duration, reason: &str) -> Instant {
    period
        .checked_mul(EXPIRY_PERIODS)
        .and_then(|window| now.checked_add(window))
        .unwrap_or_else(|| {
            warn!(
                reason = %reason,
                period = ?period,
                "repeat period out of range, alarm will not expire"
            );
            now + FAR_FUTURE
        })
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

fn publish(
    status: &watch::Sender<EngineStatus>,
    escalator: &Escalator,
    timers: &ExpiryTimers,
    outbox: &Outbox,
) {
    let current = EngineStatus {
        active_reasons: escalator.active_reasons(),
        pending_timers: timers.len(),
        backlog: outbox.backlog(),
    };
    status.send_if_modified(|previous| {
        if *previous == current {
            false
        } else {
            *previous = current;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;
    use tracing_test::traced_test;
    use zonvakt_core::alarm::{DescribedFault, DeviceClass, FanStatus};
    use zonvakt_core::event::AlarmStatus;

    const ZONE: &str = "bench/zone/box";

    fn spawn_default() -> (
        mpsc::Sender<Alarm>,
        mpsc::Receiver<AlarmEvent>,
        EngineHandle,
        MetricsRecorder,
    ) {
        let metrics = MetricsRecorder::new().unwrap();
        let (tx, rx, handle) = AlarmEngine::spawn(ZONE, &AlarmConfig::default(), metrics.clone());
        (tx, rx, handle, metrics)
    }

    fn device(period_ms: u64) -> Alarm {
        Alarm::missing_device(
            "bus0",
            DeviceClass::ClimateController,
            1,
            Duration::from_millis(period_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn off_fires_three_periods_after_last_raise() {
        let (tx, mut rx, _handle, _) = spawn_default();
        let start = Instant::now();

        tx.send(device(100)).await.unwrap();
        let on = rx.recv().await.unwrap();
        assert_eq!(on.status, AlarmStatus::On);
        assert_eq!(start.elapsed(), Duration::ZERO);

        for at in [50, 120, 260] {
            sleep_until(start + Duration::from_millis(at)).await;
            tx.send(device(100)).await.unwrap();
        }

        let off = rx.recv().await.unwrap();
        assert_eq!(off.status, AlarmStatus::Off);
        assert_eq!(off.reason(), on.reason());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(560), "off too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(561), "off too late: {elapsed:?}");

        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn oversized_period_saturates_the_deadline() {
        let now = Instant::now();
        assert_eq!(
            expiry_deadline(now, Duration::from_millis(100), "x"),
            now + Duration::from_millis(300)
        );
        assert_eq!(expiry_deadline(now, Duration::MAX, "x"), now + FAR_FUTURE);
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn oversized_period_keeps_the_engine_running() {
        let (tx, mut rx, handle, _) = spawn_default();

        tx.send(Alarm::missing_device(
            "bus0",
            DeviceClass::Humidifier,
            2,
            Duration::MAX,
        ))
        .await
        .unwrap();
        assert_eq!(rx.recv().await.unwrap().status, AlarmStatus::On);
        assert!(logs_contain("repeat period out of range"));

        let start = Instant::now();
        tx.send(device(100)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().status, AlarmStatus::On);
        let off = rx.recv().await.unwrap();
        assert_eq!(off.status, AlarmStatus::Off);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        assert_eq!(handle.status().active_reasons, 1);

        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn steady_raises_hold_the_alarm_on() {
        let (tx, mut rx, _handle, _) = spawn_default();
        let start = Instant::now();

        // Period 100ms: a raise every 250ms stays inside the 300ms window.
        tx.send(device(100)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().status, AlarmStatus::On);

        let mut last_raise = start;
        for _ in 0..8 {
            sleep(Duration::from_millis(250)).await;
            assert!(rx.try_recv().is_err(), "no event while re-raised");
            tx.send(device(100)).await.unwrap();
            last_raise = Instant::now();
        }

        let off = rx.recv().await.unwrap();
        assert_eq!(off.status, AlarmStatus::Off);
        assert_eq!(last_raise.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced_until_last_expiry() {
        let (tx, mut rx, handle, metrics) = spawn_default();
        let start = Instant::now();

        for at in [0, 10, 20, 30, 40] {
            sleep_until(start + Duration::from_millis(at)).await;
            tx.send(device(100)).await.unwrap();
        }
        assert_eq!(rx.recv().await.unwrap().status, AlarmStatus::On);

        sleep_until(start + Duration::from_millis(305)).await;
        assert!(rx.try_recv().is_err(), "first expiry must not clear");
        assert_eq!(
            handle.status(),
            EngineStatus {
                active_reasons: 1,
                pending_timers: 4,
                backlog: 0,
            }
        );

        let off = rx.recv().await.unwrap();
        assert_eq!(off.status, AlarmStatus::Off);
        assert_eq!(start.elapsed(), Duration::from_millis(340));
        assert_eq!(metrics.alarms_received.with_label_values(&[ZONE]).get(), 5);
        assert_eq!(
            metrics.alarm_events.with_label_values(&[ZONE, "on"]).get(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reasons_expire_independently() {
        let (tx, mut rx, _handle, _) = spawn_default();
        let start = Instant::now();
        let fan = Alarm::fan("exhaust", FanStatus::Stalled);

        tx.send(fan.clone()).await.unwrap();
        tx.send(device(100)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().alarm, fan);
        assert_eq!(rx.recv().await.unwrap().alarm, device(100));

        let first_off = rx.recv().await.unwrap();
        assert_eq!(first_off.alarm, device(100));
        assert_eq!(start.elapsed(), Duration::from_millis(300));

        let second_off = rx.recv().await.unwrap();
        assert_eq!(second_off.alarm, fan);
        assert_eq!(second_off.status, AlarmStatus::Off);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn closing_inbound_stops_without_further_events() {
        let (tx, mut rx, handle, _) = spawn_default();
        let start = Instant::now();

        for fault in [
            DescribedFault::WaterLevelCritical,
            DescribedFault::HumidityOutOfBound,
            DescribedFault::SensorReadoutIssue,
        ] {
            tx.send(Alarm::described(fault)).await.unwrap();
        }
        for _ in 0..3 {
            assert_eq!(rx.recv().await.unwrap().status, AlarmStatus::On);
        }

        drop(tx);
        assert!(rx.recv().await.is_none());
        assert!(start.elapsed() < Duration::from_millis(1500));

        let mut status = handle.subscribe();
        handle.join().await.unwrap();
        assert_eq!(*status.borrow_and_update(), EngineStatus::default());
        assert!(logs_contain("alarm engine stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_outbound_sheds_oldest_backlog_entry() {
        let metrics = MetricsRecorder::new().unwrap();
        let config = AlarmConfig {
            inbound_capacity: 30,
            outbound_capacity: 1,
            backlog: 2,
        };
        let (tx, mut rx, handle) = AlarmEngine::spawn(ZONE, &config, metrics.clone());

        let faults = [
            DescribedFault::WaterLevelWarning,
            DescribedFault::WaterLevelCritical,
            DescribedFault::HumidityUnreachable,
            DescribedFault::TemperatureUnreachable,
        ];
        for fault in faults {
            tx.send(Alarm::described(fault)).await.unwrap();
        }
        sleep(Duration::from_millis(1)).await;

        assert_eq!(handle.status().backlog, 2);
        assert_eq!(
            metrics.alarm_events_dropped.with_label_values(&[ZONE]).get(),
            1
        );

        for expected in [faults[0], faults[2], faults[3]] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.alarm, Alarm::described(expected));
            assert_eq!(event.status, AlarmStatus::On);
        }
    }
}
