//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use validator::ValidationError;

use crate::zone::ZoneConfig;

/// Validate that a zone name can be embedded in a `<host>/zone/<name>` identifier.
pub fn validate_zone_name(name: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;

    if re.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_zone_name"))
    }
}

/// Validate an explicit host name. It must not contain the `/zone/`
/// separator or any other `/`.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^[A-Za-z0-9][A-Za-z0-9_.-]{0,252}$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;

    if re.is_match(host) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_host"))
    }
}

/// Validate that every configured minimum is below its maximum.
pub fn validate_bounds(zone: &ZoneConfig) -> Result<(), ValidationError> {
    zone.bounds().check().map_err(|e| {
        let mut error = ValidationError::new("invalid_bounds");
        error.message = Some(e.to_string().into());
        error
    })
}

/// Validate a probability in `[0, 1]`.
pub fn validate_probability(value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_probability"))
    }
}
