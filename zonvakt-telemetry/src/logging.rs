//! ## zonvakt-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! Every long-running loop runs inside a span carrying the component and
//! zone it belongs to, so a multi-zone process can be filtered per zone.

use tracing::{info_span, Span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` takes precedence over
    /// `default_filter`.
    pub fn init(default_filter: &str, format: LogFormat) -> Result<(), TryInitError> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        match format {
            LogFormat::Text => tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_thread_names(true)
                        .with_span_events(FmtSpan::NONE),
                )
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_current_span(true))
                .try_init(),
        }
    }

    /// Like [`EventLogger::init`] but a subscriber that is already installed
    /// is left in place.
    pub fn try_init(default_filter: &str, format: LogFormat) {
        if Self::init(default_filter, format).is_err() {
            tracing::debug!("global subscriber already installed");
        }
    }

    /// Span for a per-zone task such as an escalation engine or a relay.
    pub fn zone_span(component: &'static str, zone: &str) -> Span {
        info_span!("zone_task", component = component, zone = %zone)
    }
}
