//! # zonvakt Configuration System
//!
//! Hierarchical configuration for a zone's escalation engine and relay.
//!
//! ## Features
//! - **Unified Configuration**: one file describes the zone, its alarm engine
//!   sizing, the central service link and logging
//! - **Validation**: every section is checked with `validator` after loading
//! - **Environment Awareness**: per-environment overrides and `ZONVAKT_*`
//!   variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod alarm;
mod error;
mod relay;
mod simulator;
mod telemetry;
mod validation;
mod zone;

pub use alarm::AlarmConfig;
pub use error::ConfigError;
pub use relay::RelayConfig;
pub use simulator::SimulatorConfig;
pub use telemetry::TelemetryConfig;
pub use zone::ZoneConfig;

const BASE_CONFIG: &str = "config/zonvakt.yaml";
const ENV_PREFIX: &str = "ZONVAKT_";

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct ZonvaktConfig {
    /// Identity and climate limits of the zone.
    #[validate(nested)]
    #[serde(default)]
    pub zone: ZoneConfig,

    /// Escalation engine channel sizing.
    #[validate(nested)]
    #[serde(default)]
    pub alarm: AlarmConfig,

    /// Central service link and local history.
    #[validate(nested)]
    #[serde(default)]
    pub relay: RelayConfig,

    /// Logging.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Simulated zone used by `zonvakt simulate`.
    #[validate(nested)]
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl ZonvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/zonvakt.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - Environment‑specific overrides, where
    ///    the environment comes from `ZONVAKT_ENV` (default `production`).
    /// 4. `ZONVAKT_*` environment variables, `__` separating nested keys.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ZonvaktConfig::default()));

        if Path::new(BASE_CONFIG).exists() {
            figment = figment.merge(Yaml::file(BASE_CONFIG));
        }

        let env = std::env::var("ZONVAKT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific path, still honouring `ZONVAKT_*`
    /// overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment =
            Figment::from(Serialized::defaults(ZonvaktConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
