//! Catching the central service up on persisted history.
//!
//! Both logs are walked with one cursor in steps of [`REPLAY_BATCH_SIZE`].
//! Each step carries the next slice of whichever logs still have entries, so
//! the shorter log is exhausted early and later batches carry only the
//! longer one. The final batch is flagged `last`.

use tracing::{debug, warn};
use zonvakt_core::event::AlarmEvent;
use zonvakt_core::report::{BatchReport, ClimateReport};
use zonvakt_telemetry::MetricsRecorder;

use crate::service::CentralService;

pub const REPLAY_BATCH_SIZE: usize = 200;

/// Iterator over the batches of one replay.
#[derive(Debug)]
pub struct ReplayBatches<'a> {
    zone: &'a str,
    climates: &'a [ClimateReport],
    alarms: &'a [AlarmEvent],
    cursor: usize,
}

impl<'a> ReplayBatches<'a> {
    pub fn new(zone: &'a str, climates: &'a [ClimateReport], alarms: &'a [AlarmEvent]) -> Self {
        Self {
            zone,
            climates,
            alarms,
            cursor: 0,
        }
    }

    fn total(&self) -> usize {
        self.climates.len().max(self.alarms.len())
    }
}

fn window<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let from = from.min(items.len());
    let to = to.min(items.len());
    items[from..to].to_vec()
}

impl Iterator for ReplayBatches<'_> {
    type Item = BatchReport;

    fn next(&mut self) -> Option<BatchReport> {
        let total = self.total();
        if self.cursor >= total {
            return None;
        }

        let end = (self.cursor + REPLAY_BATCH_SIZE).min(total);
        let batch = BatchReport {
            zone: self.zone.to_string(),
            alarms: window(self.alarms, self.cursor, end),
            climates: window(self.climates, self.cursor, end),
            last: end == total,
        };
        self.cursor = end;
        Some(batch)
    }
}

/// Sends every batch of the replay over `service`. A failed batch is logged
/// and the remaining ones are still sent. Returns how many were delivered.
pub async fn replay<S>(
    service: &mut S,
    zone: &str,
    climates: &[ClimateReport],
    alarms: &[AlarmEvent],
    metrics: &MetricsRecorder,
) -> usize
where
    S: CentralService + ?Sized,
{
    let mut delivered = 0;
    for batch in ReplayBatches::new(zone, climates, alarms) {
        match service.batch_report(&batch).await {
            Ok(()) => {
                delivered += 1;
                metrics.inc_batches_sent(zone);
                debug!(
                    climates = batch.climates.len(),
                    alarms = batch.alarms.len(),
                    last = batch.last,
                    "history batch delivered"
                );
            }
            Err(err) => {
                metrics.inc_call_errors(zone, err.kind());
                warn!(error = %err, last = batch.last, "history batch rejected");
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use zonvakt_core::alarm::{Alarm, DescribedFault};
    use zonvakt_core::event::AlarmStatus;

    fn climates(n: usize) -> Vec<ClimateReport> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                ClimateReport::new(
                    start + chrono::Duration::seconds(i as i64),
                    50.0,
                    [20.0; 4],
                )
            })
            .collect()
    }

    fn alarms(n: usize) -> Vec<AlarmEvent> {
        (0..n)
            .map(|i| {
                AlarmEvent::new(
                    "h/zone/z",
                    Alarm::described(DescribedFault::SensorReadoutIssue),
                    if i % 2 == 0 { AlarmStatus::On } else { AlarmStatus::Off },
                    Utc::now(),
                )
            })
            .collect()
    }

    #[test]
    fn longer_log_drives_the_batch_count() {
        let climates = climates(450);
        let alarms = alarms(50);
        let batches: Vec<_> = ReplayBatches::new("h/zone/z", &climates, &alarms).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].climates, climates[0..200]);
        assert_eq!(batches[0].alarms, alarms);
        assert_eq!(batches[1].climates, climates[200..400]);
        assert!(batches[1].alarms.is_empty());
        assert_eq!(batches[2].climates, climates[400..450]);
        assert!(batches[2].alarms.is_empty());
        assert_eq!(
            batches.iter().map(|b| b.last).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[test]
    fn exact_multiple_ends_on_a_full_batch() {
        let climates = climates(0);
        let alarms = alarms(400);
        let batches: Vec<_> = ReplayBatches::new("h/zone/z", &climates, &alarms).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].alarms.len(), REPLAY_BATCH_SIZE);
        assert!(batches[1].last);
    }

    #[test]
    fn empty_logs_send_nothing() {
        assert_eq!(ReplayBatches::new("h/zone/z", &[], &[]).count(), 0);
    }

    #[test]
    fn small_logs_fit_one_final_batch() {
        let climates = climates(3);
        let alarms = alarms(5);
        let batches: Vec<_> = ReplayBatches::new("h/zone/z", &climates, &alarms).collect();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].last);
        assert_eq!(batches[0].climates.len(), 3);
        assert_eq!(batches[0].alarms.len(), 5);
    }
}
