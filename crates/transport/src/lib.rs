//! Retrying HTTP transport.
//!
//! Executes one logical HTTP operation against the remote instance with a
//! bounded retry budget. Only transient network faults (timeouts, connection
//! resets and the like) consume retries; HTTP-level failures are terminal on
//! the first response.

mod client;
mod request;

pub use client::Transport;
pub use request::{Body, Method, RequestSpec};

use std::time::Duration;

/// Maximum underlying attempts per logical operation.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between retry attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(300);

/// Errors produced by the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Retry budget exhausted by transient network faults.
    #[error("{method} {target} could not be processed")]
    RetriesExhausted { method: Method, target: String },

    /// The server answered with a non-success status.
    #[error("{method} {target} failed with status {code}")]
    Status {
        method: Method,
        target: String,
        code: u16,
    },

    /// Non-retryable request failure (bad URL, TLS setup, request build).
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Local I/O fault while reading an upload body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}
