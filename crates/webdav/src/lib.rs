//! WebDAV client for the remote cartridge tree.
//!
//! Maps local cartridge paths onto the remote code-version layout and
//! issues file/collection operations through the retrying transport.

mod client;
mod path;

pub use client::DavClient;
pub use path::{to_remote_path, CARTRIDGE_MARKER};

use std::path::PathBuf;

use cartsync_transport::TransportError;

/// Errors from the WebDAV client.
#[derive(Debug, thiserror::Error)]
pub enum DavError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The local path carries no cartridge marker segment and cannot be
    /// mapped onto the remote layout.
    #[error("path has no cartridge marker: {}", .0.display())]
    OutsideCartridge(PathBuf),

    #[error("archive has no file name: {}", .0.display())]
    BadArchiveName(PathBuf),
}
