//! Session-authenticated import workflows.
//!
//! Drives multi-step remote jobs (site import, metadata import/validation,
//! code-version activation) against the stateful admin console: form login,
//! CSRF token capture, staging-area transfers, job triggers and status
//! polling until a terminal state.

mod client;
mod import;
mod session;
mod status;

pub use client::WorkflowClient;
pub use import::{run_meta_import, run_site_import, ImportPhase};
pub use session::{extract_csrf, MIN_TOKEN_LEN};
pub use status::{parse_status, JobKind, JobOutcome};

use std::path::PathBuf;

use cartsync_transport::TransportError;

/// Errors from workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Another import is already running; starting a second would corrupt
    /// remote state.
    #[error("an import is already in progress: {0}")]
    ImportInProgress(String),

    /// The remote job reached a terminal error state.
    #[error("import job failed: {0}")]
    JobFailed(String),

    #[error("archive has no file name: {}", .0.display())]
    BadArchiveName(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
