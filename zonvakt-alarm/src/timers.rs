//! Expiry timers.
//!
//! One entry per raise, ordered by deadline. Entries sharing a deadline keep
//! their scheduling order through a monotonic sequence number, so several
//! timers for the same reason can be pending at once.

use std::collections::BTreeMap;

use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct ExpiryTimers {
    entries: BTreeMap<(Instant, u64), String>,
    next_seq: u64,
}

impl ExpiryTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, reason: String) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline, seq), reason);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Removes and returns the reasons of every timer due at `now`, earliest
    /// first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<String> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every pending timer, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let pending = self.entries.len();
        self.entries.clear();
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn due_timers_pop_in_deadline_order() {
        let start = Instant::now();
        let mut timers = ExpiryTimers::new();
        timers.schedule(start + Duration::from_millis(300), "b".into());
        timers.schedule(start + Duration::from_millis(100), "a".into());
        timers.schedule(start + Duration::from_millis(900), "c".into());

        assert_eq!(timers.next_deadline(), Some(start + Duration::from_millis(100)));
        assert_eq!(timers.pop_due(start + Duration::from_millis(300)), vec!["a", "b"]);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn same_deadline_keeps_schedule_order() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let mut timers = ExpiryTimers::new();
        timers.schedule(deadline, "x".into());
        timers.schedule(deadline, "y".into());
        timers.schedule(deadline, "x".into());

        assert_eq!(timers.pop_due(deadline), vec!["x", "y", "x"]);
        assert!(timers.is_empty());
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn nothing_due_before_deadline() {
        let start = Instant::now();
        let mut timers = ExpiryTimers::new();
        timers.schedule(start + Duration::from_millis(10), "a".into());
        assert!(timers.pop_due(start).is_empty());
        assert_eq!(timers.clear(), 1);
    }
}
