//! Identity and climate limits of the monitored zone.

use serde::{Deserialize, Serialize};
use validator::Validate;
use zonvakt_core::zone::{ClimateBounds, ZoneKey};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[validate(schema(function = validation::validate_bounds))]
pub struct ZoneConfig {
    /// Host name reported to the central service. Defaults to the machine
    /// host name.
    #[serde(default)]
    #[validate(custom(function = validation::validate_host))]
    pub host: Option<String>,

    /// Zone name, unique on this host.
    #[serde(default = "default_name")]
    #[validate(custom(function = validation::validate_zone_name))]
    pub name: String,

    #[serde(default)]
    pub min_temperature: Option<f64>,
    #[serde(default)]
    pub max_temperature: Option<f64>,
    #[serde(default)]
    pub min_humidity: Option<f64>,
    #[serde(default)]
    pub max_humidity: Option<f64>,
}

fn default_name() -> String {
    "zone-1".into()
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            host: None,
            name: default_name(),
            min_temperature: None,
            max_temperature: None,
            min_humidity: None,
            max_humidity: None,
        }
    }
}

impl ZoneConfig {
    pub fn resolved_host(&self) -> String {
        match &self.host {
            Some(host) if !host.is_empty() => host.clone(),
            _ => gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }

    pub fn key(&self) -> ZoneKey {
        ZoneKey::new(self.resolved_host(), self.name.clone())
    }

    pub fn bounds(&self) -> ClimateBounds {
        ClimateBounds {
            min_temperature: self.min_temperature,
            max_temperature: self.max_temperature,
            min_humidity: self.min_humidity,
            max_humidity: self.max_humidity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_host_wins() {
        let config = ZoneConfig {
            host: Some("greenhouse".into()),
            ..Default::default()
        };
        assert_eq!(config.key().full_name(), "greenhouse/zone/zone-1");
    }

    #[test]
    fn host_with_separator_fails_validation() {
        let config = ZoneConfig {
            host: Some("a/zone/b".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validated_key_parses_back() {
        let config = ZoneConfig {
            host: Some("rack-2.farm.local".into()),
            name: "nest_2.north".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        let key = config.key();
        assert_eq!(key.full_name().parse::<ZoneKey>().unwrap(), key);
    }

    #[test]
    fn inverted_bounds_fail_validation() {
        let config = ZoneConfig {
            min_temperature: Some(30.0),
            max_temperature: Some(20.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
