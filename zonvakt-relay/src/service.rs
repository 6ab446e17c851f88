//! Contract with the central service.

use async_trait::async_trait;
use zonvakt_core::event::AlarmEvent;
use zonvakt_core::report::{BatchReport, NamedClimateReport, StateReport};
use zonvakt_core::zone::{ZoneKey, ZoneRegistration};

use crate::error::CallError;

/// One live connection to the central service.
#[async_trait]
pub trait CentralService: Send {
    /// Registers a zone, replacing any entry with the same host and name.
    async fn register_zone(&mut self, registration: &ZoneRegistration) -> Result<(), CallError>;

    async fn zone_is_registered(&mut self, key: &ZoneKey) -> Result<bool, CallError>;

    async fn unregister_zone(&mut self, key: &ZoneKey) -> Result<(), CallError>;

    async fn report_climate(&mut self, report: &NamedClimateReport) -> Result<(), CallError>;

    async fn report_alarm(&mut self, event: &AlarmEvent) -> Result<(), CallError>;

    async fn report_state(&mut self, report: &StateReport) -> Result<(), CallError>;

    /// Delivers a slice of persisted history. Only used while catching up.
    async fn batch_report(&mut self, batch: &BatchReport) -> Result<(), CallError>;
}

/// Opens connections to the central service.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: CentralService + 'static;

    async fn connect(&self) -> Result<Self::Connection, CallError>;
}
