//! Non-blocking event emission.
//!
//! Events go straight into the outbound channel when it has room. Otherwise
//! they wait in a bounded backlog that the engine loop flushes as capacity
//! frees up. A full backlog sheds its oldest event.

use std::collections::VecDeque;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};
use zonvakt_core::event::AlarmEvent;
use zonvakt_telemetry::MetricsRecorder;

#[derive(Debug)]
pub struct Outbox {
    zone: String,
    queued: VecDeque<AlarmEvent>,
    capacity: usize,
    metrics: MetricsRecorder,
}

impl Outbox {
    pub fn new(zone: impl Into<String>, capacity: usize, metrics: MetricsRecorder) -> Self {
        Self {
            zone: zone.into(),
            queued: VecDeque::new(),
            capacity: capacity.max(1),
            metrics,
        }
    }

    /// Hands `event` to `outbound` without waiting.
    pub fn emit(&mut self, outbound: &Sender<AlarmEvent>, event: AlarmEvent) {
        self.metrics.inc_alarm_events(&self.zone, event.status.as_str());

        if !self.queued.is_empty() {
            self.enqueue(event);
            return;
        }

        match outbound.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => self.enqueue(event),
            Err(TrySendError::Closed(event)) => {
                debug!(reason = %event.reason(), "event receiver gone, event discarded");
            }
        }
    }

    fn enqueue(&mut self, event: AlarmEvent) {
        if self.queued.len() >= self.capacity {
            if let Some(dropped) = self.queued.pop_front() {
                self.metrics.inc_alarm_events_dropped(&self.zone);
                warn!(
                    reason = %dropped.reason(),
                    status = dropped.status.as_str(),
                    "emission backlog full, oldest event dropped"
                );
            }
        }
        self.queued.push_back(event);
    }

    pub fn pop(&mut self) -> Option<AlarmEvent> {
        self.queued.pop_front()
    }

    pub fn has_backlog(&self) -> bool {
        !self.queued.is_empty()
    }

    pub fn backlog(&self) -> usize {
        self.queued.len()
    }

    /// Empties the backlog, returning how many events were discarded.
    pub fn discard(&mut self) -> usize {
        let discarded = self.queued.len();
        self.queued.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use zonvakt_core::alarm::{Alarm, DescribedFault};
    use zonvakt_core::event::AlarmStatus;

    fn event(fault: DescribedFault) -> AlarmEvent {
        AlarmEvent::new("h/zone/z", Alarm::described(fault), AlarmStatus::On, Utc::now())
    }

    #[test]
    fn overflow_drops_oldest() {
        let metrics = MetricsRecorder::new().unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let mut outbox = Outbox::new("h/zone/z", 2, metrics.clone());

        outbox.emit(&tx, event(DescribedFault::WaterLevelWarning));
        outbox.emit(&tx, event(DescribedFault::WaterLevelCritical));
        outbox.emit(&tx, event(DescribedFault::HumidityUnreachable));
        outbox.emit(&tx, event(DescribedFault::SensorReadoutIssue));

        assert_eq!(outbox.backlog(), 2);
        assert_eq!(
            metrics.alarm_events_dropped.with_label_values(&["h/zone/z"]).get(),
            1
        );

        let sent = rx.try_recv().unwrap();
        assert_eq!(sent.alarm, Alarm::described(DescribedFault::WaterLevelWarning));
        assert_eq!(
            outbox.pop().unwrap().alarm,
            Alarm::described(DescribedFault::HumidityUnreachable)
        );
        assert_eq!(
            outbox.pop().unwrap().alarm,
            Alarm::described(DescribedFault::SensorReadoutIssue)
        );
    }

    #[test]
    fn backlog_preserves_order_after_capacity_frees() {
        let metrics = MetricsRecorder::new().unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let mut outbox = Outbox::new("h/zone/z", 8, metrics);

        outbox.emit(&tx, event(DescribedFault::WaterLevelWarning));
        outbox.emit(&tx, event(DescribedFault::WaterLevelCritical));
        rx.try_recv().unwrap();

        // Room in the channel, but an older event is still queued.
        outbox.emit(&tx, event(DescribedFault::HumidityUnreachable));
        assert_eq!(outbox.backlog(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_discards_silently() {
        let metrics = MetricsRecorder::new().unwrap();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut outbox = Outbox::new("h/zone/z", 8, metrics);
        outbox.emit(&tx, event(DescribedFault::WaterLevelWarning));
        assert!(!outbox.has_backlog());
        assert_eq!(outbox.discard(), 0);
    }
}
