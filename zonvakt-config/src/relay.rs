//! Connection to the central service.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct RelayConfig {
    /// Address of the central service.
    #[serde(default = "default_address")]
    #[validate(length(min = 1))]
    pub address: String,

    /// Delay before each reconnection attempt (seconds).
    #[serde(default = "default_reconnection_window")]
    #[validate(range(min = 1, max = 3600))]
    pub reconnection_window_secs: u64,

    /// Consecutive failed reconnections after which live reporting is
    /// disabled for good.
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1))]
    pub max_attempts: u32,

    /// Capacity of each of the climate, alarm and state input channels.
    #[serde(default = "default_input_capacity")]
    #[validate(range(min = 1, max = 65536))]
    pub input_capacity: usize,

    /// Climate history written locally, replayed after a re-registration.
    #[serde(default)]
    pub climate_log: Option<PathBuf>,

    /// Alarm history written locally, replayed after a re-registration.
    #[serde(default)]
    pub alarm_log: Option<PathBuf>,
}

fn default_address() -> String {
    "localhost:3001".into()
}

fn default_reconnection_window() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    1000
}

fn default_input_capacity() -> usize {
    20
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            reconnection_window_secs: default_reconnection_window(),
            max_attempts: default_max_attempts(),
            input_capacity: default_input_capacity(),
            climate_log: None,
            alarm_log: None,
        }
    }
}

impl RelayConfig {
    pub fn reconnection_window(&self) -> Duration {
        Duration::from_secs(self.reconnection_window_secs)
    }
}
