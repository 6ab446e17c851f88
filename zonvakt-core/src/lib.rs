//! # zonvakt-core
//!
//! Shared value types for the zone monitoring pipeline.
//!
//! Everything in here is immutable data that crosses a task or process
//! boundary: raw alarms raised by the bus driver, the on/off events the
//! escalation engine derives from them, and the climate/state reports the
//! relay forwards to the central service.
//!
//! ### Key Submodules:
//! - `alarm`: fault conditions and their dedup key (`Reason`)
//! - `event`: on/off transitions produced by the escalation engine
//! - `report`: climate and state telemetry, replay batches
//! - `zone`: zone identity and registration

pub mod alarm;
pub mod error;
pub mod event;
pub mod report;
pub mod zone;

pub use error::CoreError;
