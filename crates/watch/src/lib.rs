//! Change-driven sync engine.
//!
//! Watches local cartridge roots and mirrors file-level adds, changes and
//! removals to the remote tree, one remote mutation at a time through the
//! serial queue. Content hashing suppresses uploads for spurious change
//! notifications, and the initial scan seeds baseline state without
//! re-uploading a tree the remote is assumed to already mirror.

mod engine;
mod hash;
mod store;

pub use engine::{FsEvent, SyncEngine};
pub use hash::hash_file;
pub use store::{RemoteStore, StoreError, StoreFuture};

use cartsync_queue::QueueError;

/// Errors from the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad exclude pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
