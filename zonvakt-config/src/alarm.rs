//! Escalation engine sizing.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct AlarmConfig {
    /// Capacity of the raw alarm channel. Sized to absorb a poll burst
    /// without blocking the bus driver.
    #[serde(default = "default_inbound_capacity")]
    #[validate(range(min = 1, max = 65536))]
    pub inbound_capacity: usize,

    /// Capacity of the on/off event channel towards the relay.
    #[serde(default = "default_outbound_capacity")]
    #[validate(range(min = 1, max = 65536))]
    pub outbound_capacity: usize,

    /// Events held back while the outbound channel is full. The oldest one
    /// is dropped beyond this.
    #[serde(default = "default_backlog")]
    #[validate(range(min = 1, max = 1048576))]
    pub backlog: usize,
}

fn default_inbound_capacity() -> usize {
    30
}

fn default_outbound_capacity() -> usize {
    60
}

fn default_backlog() -> usize {
    1024
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: default_inbound_capacity(),
            outbound_capacity: default_outbound_capacity(),
            backlog: default_backlog(),
        }
    }
}
