//! # zonvakt-simulator
//!
//! Everything needed to run a zone without hardware or a central service.
//!
//! ### Key Submodules:
//! - `registry`: in-memory central service
//! - `link`: connector over the registry with injectable link failures
//! - `producer`: seeded synthetic zone raising alarms and sampling climate

pub mod link;
pub mod producer;
pub mod registry;

pub use link::{
    LinkFailureModel, NoLinkFailure, OutageSwitch, ProbabilisticLinkFailure, SimulatedConnection,
    SimulatedConnector,
};
pub use producer::{ProducerSummary, ZoneSimulator};
pub use registry::{RegisteredAlarm, RegisteredZone, ZoneRegistry};
