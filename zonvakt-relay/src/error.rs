use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single call to the central service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The link is unusable; the relay reconnects.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service rejected the call (e.g. unknown zone). The link is fine.
    #[error("application error: {0}")]
    Application(String),
}

impl CallError {
    pub fn is_transport(&self) -> bool {
        matches!(self, CallError::Transport(_))
    }

    /// Metric label of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Transport(_) => "transport",
            CallError::Application(_) => "application",
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl HistoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HistoryError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        HistoryError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Startup failure of a relay. Once running, a relay never fails.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("could not connect to the central service: {0}")]
    Connect(#[source] CallError),

    #[error("could not register zone {zone}: {source}")]
    Register {
        zone: String,
        #[source]
        source: CallError,
    },
}
