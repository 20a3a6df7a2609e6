//! Remote mutation surface consumed by the sync engine.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use cartsync_webdav::DavClient;

/// Failure of a single remote mutation.
///
/// The engine only logs these; carrying the rendered message is enough.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Boxed future returned by [`RemoteStore`] operations.
pub type StoreFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

/// Remote mutations the sync engine issues for filesystem events.
///
/// Implemented by [`DavClient`]; tests substitute a recorder.
pub trait RemoteStore: Send + Sync {
    /// Uploads the file at the given local path.
    fn put_file(&self, path: PathBuf) -> StoreFuture<'_>;

    /// Creates the remote directory for the given local path.
    fn make_dir(&self, path: PathBuf) -> StoreFuture<'_>;

    /// Removes the remote file or directory for the given local path.
    fn remove(&self, path: PathBuf) -> StoreFuture<'_>;
}

impl RemoteStore for DavClient {
    fn put_file(&self, path: PathBuf) -> StoreFuture<'_> {
        Box::pin(async move {
            self.put(&path)
                .await
                .map_err(|e| StoreError(e.to_string()))
        })
    }

    fn make_dir(&self, path: PathBuf) -> StoreFuture<'_> {
        Box::pin(async move {
            self.mkcol(&path)
                .await
                .map_err(|e| StoreError(e.to_string()))
        })
    }

    fn remove(&self, path: PathBuf) -> StoreFuture<'_> {
        Box::pin(async move {
            self.delete(&path)
                .await
                .map_err(|e| StoreError(e.to_string()))
        })
    }
}
