//! # zonvakt-alarm
//!
//! Per-zone alarm escalation engine.
//!
//! The bus driver raises the same [`Alarm`](zonvakt_core::alarm::Alarm) on
//! every poll cycle for as long as a fault persists. The engine turns that
//! stream into one `On` event when a reason first appears and one `Off` event
//! once it has not been raised for three repeat periods.
//!
//! ### Key Submodules:
//! - `escalation`: per-reason activity counters (no timing)
//! - `timers`: ordered expiry timer arena
//! - `outbox`: non-blocking emission with a bounded backlog
//! - `engine`: the `tokio` task tying them together

pub mod engine;
pub mod escalation;
pub mod outbox;
pub mod timers;

pub use engine::{AlarmEngine, EngineHandle, EngineStatus};
pub use escalation::Escalator;
