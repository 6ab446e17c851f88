use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("Invalid zone name: {0}")]
    InvalidZoneName(String),

    #[error("Invalid {quantity} bounds: minimum {min} exceeds maximum {max}")]
    InvalidBounds {
        quantity: &'static str,
        min: f64,
        max: f64,
    },
}
