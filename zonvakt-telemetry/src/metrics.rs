//! ## zonvakt-telemetry::metrics
//! **Prometheus counters, labelled per zone**
//!
//! One recorder is shared (cloned) by every engine and relay of a process.

use prometheus::{IntCounterVec, Opts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub alarms_received: IntCounterVec,
    pub alarm_events: IntCounterVec,
    pub alarm_events_dropped: IntCounterVec,
    pub reports_forwarded: IntCounterVec,
    pub reports_dropped: IntCounterVec,
    pub reconnect_attempts: IntCounterVec,
    pub batches_sent: IntCounterVec,
    pub call_errors: IntCounterVec,
}

fn counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let alarms_received = counter_vec(
            &registry,
            "zonvakt_alarms_received_total",
            "Raw alarm occurrences received by the escalation engine",
            &["zone"],
        )?;
        let alarm_events = counter_vec(
            &registry,
            "zonvakt_alarm_events_total",
            "Alarm on/off events emitted by the escalation engine",
            &["zone", "status"],
        )?;
        let alarm_events_dropped = counter_vec(
            &registry,
            "zonvakt_alarm_events_dropped_total",
            "Alarm events dropped because the emission backlog overflowed",
            &["zone"],
        )?;
        let reports_forwarded = counter_vec(
            &registry,
            "zonvakt_reports_forwarded_total",
            "Reports delivered to the central service",
            &["zone", "stream"],
        )?;
        let reports_dropped = counter_vec(
            &registry,
            "zonvakt_reports_dropped_total",
            "Reports consumed while disconnected and not forwarded",
            &["zone", "stream"],
        )?;
        let reconnect_attempts = counter_vec(
            &registry,
            "zonvakt_reconnect_attempts_total",
            "Reconnection attempts to the central service",
            &["zone"],
        )?;
        let batches_sent = counter_vec(
            &registry,
            "zonvakt_batches_sent_total",
            "History batches replayed after a re-registration",
            &["zone"],
        )?;
        let call_errors = counter_vec(
            &registry,
            "zonvakt_call_errors_total",
            "Failed remote calls by error kind",
            &["zone", "kind"],
        )?;

        Ok(Self {
            registry,
            alarms_received,
            alarm_events,
            alarm_events_dropped,
            reports_forwarded,
            reports_dropped,
            reconnect_attempts,
            batches_sent,
            call_errors,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn inc_alarms_received(&self, zone: &str) {
        self.alarms_received.with_label_values(&[zone]).inc();
    }

    pub fn inc_alarm_events(&self, zone: &str, status: &str) {
        self.alarm_events.with_label_values(&[zone, status]).inc();
    }

    pub fn inc_alarm_events_dropped(&self, zone: &str) {
        self.alarm_events_dropped.with_label_values(&[zone]).inc();
    }

    pub fn inc_reports_forwarded(&self, zone: &str, stream: &str) {
        self.reports_forwarded.with_label_values(&[zone, stream]).inc();
    }

    pub fn inc_reports_dropped(&self, zone: &str, stream: &str) {
        self.reports_dropped.with_label_values(&[zone, stream]).inc();
    }

    pub fn inc_reconnect_attempts(&self, zone: &str) {
        self.reconnect_attempts.with_label_values(&[zone]).inc();
    }

    pub fn inc_batches_sent(&self, zone: &str) {
        self.batches_sent.with_label_values(&[zone]).inc();
    }

    pub fn inc_call_errors(&self, zone: &str, kind: &str) {
        self.call_errors.with_label_values(&[zone, kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_labelled_per_zone() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.inc_reports_forwarded("h/zone/a", "climate");
        metrics.inc_reports_forwarded("h/zone/a", "climate");
        metrics.inc_reports_forwarded("h/zone/b", "climate");

        assert_eq!(
            metrics
                .reports_forwarded
                .with_label_values(&["h/zone/a", "climate"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .reports_forwarded
                .with_label_values(&["h/zone/b", "climate"])
                .get(),
            1
        );
    }

    #[test]
    fn exposition_contains_registered_families() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.inc_alarm_events("h/zone/a", "on");
        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("zonvakt_alarm_events_total"));
        assert!(text.contains("status=\"on\""));
    }
}
