// src/error.rs

//! Error taxonomy for the tracking pipeline.

use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackError>;

#[derive(Error, Debug)]
pub enum TrackError {
    /// Non-2xx response after the retry budget was spent (or a non-retryable status).
    #[error("upstream request failed ({status}): {body}")]
    Transport { status: u16, body: String },

    /// 2xx response carrying a non-success application code.
    #[error("upstream rejected request ({status}, code {code}): {message}")]
    UpstreamRejected {
        status: u16,
        code: String,
        message: String,
        body: String,
    },

    /// Connection, TLS or timeout failure before any status was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watch store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The limiter lost the task (its worker panicked) before a result was produced.
    #[error("rate limiter task dropped before completion")]
    TaskDropped,
}

impl TrackError {
    pub fn store(message: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable(message.to_string())
    }

    pub fn notify(message: impl std::fmt::Display) -> Self {
        Self::Notify(message.to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// HTTP status attached to the failure, if the upstream answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } | Self::UpstreamRejected { status, .. } => {
                Some(*status)
            }
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
