//! Error types for sanus-node.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("recognition service error: {0}")]
    Recognition(String),

    #[error("{operation} timed out after {secs:.1}s")]
    Timeout { operation: &'static str, secs: f64 },

    #[error("telemetry sink rejected event: {0}")]
    Sink(String),

    #[error("profile store error: {0}")]
    Profile(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a timeout or connection-level failure (as opposed to a bad response)?
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
