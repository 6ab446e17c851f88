//! Zone identity and registration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const ZONE_SEPARATOR: &str = "/zone/";

/// Identity of a zone at the central service: the host running it plus the
/// zone name on that host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneKey {
    pub host: String,
    pub name: String,
}

impl ZoneKey {
    pub fn new(host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
        }
    }

    /// `<host>/zone/<name>`, the identifier carried by every report.
    pub fn full_name(&self) -> String {
        format!("{}{}{}", self.host, ZONE_SEPARATOR, self.name)
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.host, ZONE_SEPARATOR, self.name)
    }
}

impl FromStr for ZoneKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(ZONE_SEPARATOR) {
            Some((host, name)) if !host.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(ZoneKey::new(host, name))
            }
            _ => Err(CoreError::InvalidZoneName(s.to_string())),
        }
    }
}

/// Optional climate limits a zone is expected to stay within.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateBounds {
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub min_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
}

impl ClimateBounds {
    pub fn check(&self) -> Result<(), CoreError> {
        check_pair("temperature", self.min_temperature, self.max_temperature)?;
        check_pair("humidity", self.min_humidity, self.max_humidity)
    }
}

fn check_pair(quantity: &'static str, min: Option<f64>, max: Option<f64>) -> Result<(), CoreError> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(CoreError::InvalidBounds { quantity, min, max }),
        _ => Ok(()),
    }
}

/// Registration of a zone with the central service. Registering the same
/// (host, name) twice replaces the previous entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRegistration {
    pub host: String,
    pub name: String,
    #[serde(flatten)]
    pub bounds: ClimateBounds,
    /// Whether the zone keeps local history it will replay.
    pub will_log: bool,
}

impl ZoneRegistration {
    pub fn new(key: ZoneKey, bounds: ClimateBounds) -> Self {
        Self {
            host: key.host,
            name: key.name,
            bounds,
            will_log: false,
        }
    }

    pub fn key(&self) -> ZoneKey {
        ZoneKey::new(self.host.clone(), self.name.clone())
    }

    pub fn full_name(&self) -> String {
        self.key().full_name()
    }
}
