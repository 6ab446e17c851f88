//! Simulated zone and link parameters for `zonvakt simulate`.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SimulatorConfig {
    /// Seed for the synthetic producer and the link failure model.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Simulated run time (seconds).
    #[serde(default = "default_duration")]
    #[validate(range(min = 1, max = 86400))]
    pub duration_secs: u64,

    /// Probability that any single remote call fails with a transport error.
    #[serde(default)]
    #[validate(custom(function = validation::validate_probability))]
    pub loss_probability: f64,

    /// Start of a full link outage, in seconds from the start of the run.
    #[serde(default)]
    pub outage_at_secs: Option<u64>,

    /// Length of the outage (seconds).
    #[serde(default = "default_outage")]
    pub outage_secs: u64,

    /// The central service loses its registry during the outage, as if it
    /// had restarted.
    #[serde(default)]
    pub restart_central: bool,
}

fn default_seed() -> u64 {
    42
}

fn default_duration() -> u64 {
    30
}

fn default_outage() -> u64 {
    10
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            duration_secs: default_duration(),
            loss_probability: 0.0,
            outage_at_secs: None,
            outage_secs: default_outage(),
            restart_central: false,
        }
    }
}
