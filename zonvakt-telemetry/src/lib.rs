//! # zonvakt Telemetry and Monitoring
//!
//! Logging setup and Prometheus counters shared by the escalation engine,
//! the relay and the CLI.

pub mod logging;
pub mod metrics;

pub use logging::{EventLogger, LogFormat};
pub use metrics::MetricsRecorder;
