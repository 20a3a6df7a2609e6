//! Sync engine: two-phase watch state machine over the serial queue.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cartsync_queue::SerialQueue;
use glob::Pattern;
use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::hash::hash_file;
use crate::store::RemoteStore;
use crate::SyncError;

/// Watch session phase.
///
/// Events seen during the initial scan seed the hash table but are never
/// propagated remotely; the remote is assumed to already mirror the
/// pre-existing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    InitialScan,
    Watching,
}

/// A normalized filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    FileCreated(PathBuf),
    DirCreated(PathBuf),
    FileChanged(PathBuf),
    Removed(PathBuf),
}

impl FsEvent {
    fn path(&self) -> &Path {
        match self {
            FsEvent::FileCreated(p)
            | FsEvent::DirCreated(p)
            | FsEvent::FileChanged(p)
            | FsEvent::Removed(p) => p,
        }
    }
}

/// Mirrors local cartridge edits to a [`RemoteStore`].
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    queue: Arc<SerialQueue>,
    /// Watch-hash table: local path → last-observed content digest.
    /// In-memory only; a restart re-seeds it from the initial scan.
    hashes: HashMap<PathBuf, String>,
    phase: Phase,
    excludes: Vec<Pattern>,
}

impl SyncEngine {
    /// Creates an engine in the initial-scan phase.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        queue: Arc<SerialQueue>,
        excludes: &[String],
    ) -> Result<Self, SyncError> {
        let excludes = excludes
            .iter()
            .map(|g| Pattern::new(g))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            store,
            queue,
            hashes: HashMap::new(),
            phase: Phase::InitialScan,
            excludes,
        })
    }

    /// Seeds the hash table from the given roots and enters the watching
    /// phase. Nothing is propagated remotely.
    pub fn seed(&mut self, roots: &[PathBuf]) -> Result<(), SyncError> {
        for root in roots {
            self.seed_dir(root)?;
        }
        self.phase = Phase::Watching;
        info!(files = self.hashes.len(), "initial scan complete");
        Ok(())
    }

    fn seed_dir(&mut self, dir: &Path) -> Result<(), SyncError> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if self.is_excluded(&path) {
                continue;
            }
            if path.is_dir() {
                self.seed_dir(&path)?;
            } else {
                match hash_file(&path) {
                    Ok(digest) => {
                        self.hashes.insert(path, digest);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "could not hash file"),
                }
            }
        }
        Ok(())
    }

    /// Number of files tracked in the watch-hash table.
    pub fn tracked(&self) -> usize {
        self.hashes.len()
    }

    /// Handles one normalized filesystem event.
    ///
    /// During the initial scan the event only updates baseline state.
    /// While watching, it enqueues at most one remote mutation; the queue
    /// advances whether that mutation succeeds or fails.
    pub fn handle_event(&mut self, event: FsEvent) {
        let path = event.path();
        if self.is_excluded(path) {
            return;
        }

        if self.phase == Phase::InitialScan {
            match &event {
                FsEvent::FileCreated(p) | FsEvent::FileChanged(p) => {
                    if let Ok(digest) = hash_file(p) {
                        self.hashes.insert(p.clone(), digest);
                    }
                }
                FsEvent::Removed(p) => {
                    self.hashes.remove(p);
                }
                FsEvent::DirCreated(_) => {}
            }
            return;
        }

        match event {
            FsEvent::FileCreated(path) => match hash_file(&path) {
                Ok(digest) => {
                    self.hashes.insert(path.clone(), digest);
                    self.enqueue_put(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "could not hash new file"),
            },
            FsEvent::DirCreated(path) => self.enqueue_mkdir(path),
            FsEvent::FileChanged(path) => match hash_file(&path) {
                Ok(digest) => {
                    if self.hashes.get(&path) == Some(&digest) {
                        // Notification fired without a content change.
                        debug!(path = %path.display(), "content unchanged, skipping upload");
                        return;
                    }
                    self.hashes.insert(path.clone(), digest);
                    self.enqueue_put(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "could not hash changed file"),
            },
            FsEvent::Removed(path) => {
                self.hashes.remove(&path);
                self.enqueue_delete(path);
            }
        }
    }

    fn enqueue_put(&self, path: PathBuf) {
        let store = Arc::clone(&self.store);
        let result = self.queue.enqueue(async move {
            match store.put_file(path.clone()).await {
                Ok(()) => info!(path = %path.display(), "synced"),
                Err(e) => error!(path = %path.display(), error = %e, "upload failed"),
            }
        });
        if let Err(e) = result {
            error!(error = %e, "could not enqueue upload");
        }
    }

    fn enqueue_mkdir(&self, path: PathBuf) {
        let store = Arc::clone(&self.store);
        let result = self.queue.enqueue(async move {
            match store.make_dir(path.clone()).await {
                Ok(()) => info!(path = %path.display(), "remote directory created"),
                Err(e) => error!(path = %path.display(), error = %e, "mkdir failed"),
            }
        });
        if let Err(e) = result {
            error!(error = %e, "could not enqueue mkdir");
        }
    }

    fn enqueue_delete(&self, path: PathBuf) {
        let store = Arc::clone(&self.store);
        let result = self.queue.enqueue(async move {
            match store.remove(path.clone()).await {
                Ok(()) => info!(path = %path.display(), "remote path removed"),
                Err(e) => error!(path = %path.display(), error = %e, "remote delete failed"),
            }
        });
        if let Err(e) = result {
            error!(error = %e, "could not enqueue delete");
        }
    }

    /// Whether a path is filtered out before any handling: dot-paths and
    /// configured exclude globs never reach the remote.
    fn is_excluded(&self, path: &Path) -> bool {
        let dotted = path.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|s| s.starts_with('.') && s != "." && s != "..")
        });
        if dotted {
            return true;
        }

        let text = path.to_string_lossy();
        self.excludes.iter().any(|p| p.matches(&text))
    }

    /// Seeds baseline state, then watches `roots` until cancelled.
    ///
    /// Watcher-level errors are logged; the underlying watch primitive is
    /// left to recover on its own.
    pub async fn run(
        mut self,
        roots: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<(), SyncError> {
        self.seed(&roots)?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let _ = tx.send(res);
            })?;
        for root in &roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            info!(root = %root.display(), "watching");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(Ok(event)) => {
                        for fs_event in normalize(event) {
                            self.handle_event(fs_event);
                        }
                    }
                    Some(Err(e)) => error!(error = %e, "watcher error"),
                    None => break,
                },
            }
        }

        // Let queued mutations land before the session ends.
        self.queue.drained().await;
        Ok(())
    }
}

/// Flattens a notify event into normalized per-path events.
fn normalize(event: notify::Event) -> Vec<FsEvent> {
    let mut out = Vec::new();
    for path in event.paths {
        match event.kind {
            EventKind::Create(CreateKind::Folder) => out.push(FsEvent::DirCreated(path)),
            EventKind::Create(CreateKind::File) => out.push(FsEvent::FileCreated(path)),
            EventKind::Create(_) => {
                if path.is_dir() {
                    out.push(FsEvent::DirCreated(path));
                } else {
                    out.push(FsEvent::FileCreated(path));
                }
            }
            EventKind::Remove(_) => out.push(FsEvent::Removed(path)),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                out.push(FsEvent::Removed(path));
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                if path.is_dir() {
                    out.push(FsEvent::DirCreated(path));
                } else {
                    out.push(FsEvent::FileCreated(path));
                }
            }
            EventKind::Modify(_) => {
                // Some platforms report renames and deletions as generic
                // modify events; resolve by what is on disk now.
                if !path.exists() {
                    out.push(FsEvent::Removed(path));
                } else if path.is_file() {
                    out.push(FsEvent::FileChanged(path));
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
    }
    out
}
