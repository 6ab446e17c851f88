//! Per-reason activity tracking.
//!
//! Every raise of a reason arms one expiry, and every expiry consumes one
//! raise. A reason is active while it has unconsumed raises; the transition
//! into and out of that state is what the engine reports.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, warn};
use zonvakt_core::alarm::Alarm;
use zonvakt_core::event::{AlarmEvent, AlarmStatus};

#[derive(Debug)]
struct Activity {
    pending: u32,
    last: Alarm,
}

/// Dedup table of one zone. Owned by a single engine task.
#[derive(Debug)]
pub struct Escalator {
    zone: String,
    active: HashMap<String, Activity>,
}

impl Escalator {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            active: HashMap::new(),
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Records one raise of `alarm` under `reason`. Returns the `On` event
    /// when the reason was idle.
    pub fn raise(&mut self, reason: &str, alarm: Alarm) -> Option<AlarmEvent> {
        match self.active.get_mut(reason) {
            Some(activity) => {
                activity.pending += 1;
                activity.last = alarm;
                debug!(reason, pending = activity.pending, "alarm re-raised");
                None
            }
            None => {
                let event = AlarmEvent::new(self.zone.clone(), alarm.clone(), AlarmStatus::On, Utc::now());
                self.active.insert(
                    reason.to_string(),
                    Activity {
                        pending: 1,
                        last: alarm,
                    },
                );
                Some(event)
            }
        }
    }

    /// Consumes one raise of `reason`. Returns the `Off` event, carrying the
    /// last raised value, when that was the final one.
    pub fn expire(&mut self, reason: &str) -> Option<AlarmEvent> {
        let Some(activity) = self.active.get_mut(reason) else {
            warn!(reason, "expiry for an inactive reason ignored");
            return None;
        };

        if activity.pending > 1 {
            activity.pending -= 1;
            return None;
        }

        self.active.remove(reason).map(|activity| {
            AlarmEvent::new(self.zone.clone(), activity.last, AlarmStatus::Off, Utc::now())
        })
    }

    pub fn is_active(&self, reason: &str) -> bool {
        self.active.contains_key(reason)
    }

    pub fn active_reasons(&self) -> usize {
        self.active.len()
    }

    /// Raises not yet consumed by an expiry for `reason`.
    pub fn pending(&self, reason: &str) -> u32 {
        self.active.get(reason).map_or(0, |a| a.pending)
    }
}
