//! # zonvakt-relay
//!
//! Forwards one zone's alarm events, climate samples and state snapshots to
//! the central service and keeps doing so across link outages.
//!
//! ### Key Submodules:
//! - `service`: the central service contract (`CentralService`, `Connector`)
//! - `history`: persisted climate/alarm logs and their readers
//! - `replay`: batching of persisted history after a re-registration
//! - `relay`: the reconnecting relay task

pub mod error;
pub mod history;
pub mod relay;
pub mod replay;
pub mod service;

pub use error::{CallError, HistoryError, RelayError};
pub use history::{AlarmLogWriter, ClimateLogWriter, FileHistory, HistorySource, NoHistory};
pub use relay::{relay_channels, RelayHandle, RelayInputs, RelayState, RelayStreams, TelemetryRelay};
pub use replay::{ReplayBatches, REPLAY_BATCH_SIZE};
pub use service::{CentralService, Connector};
