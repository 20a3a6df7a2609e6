//! Import orchestration with compensating cleanup.
//!
//! A single import walks `NotStarted → LoggedIn → ArchiveUploaded →
//! ImportTriggered → Polling → {Finished | Errored}`; whichever way it
//! ends, cleanup (remote staging archive plus local temp archive) is
//! always attempted before the result is surfaced.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::WorkflowClient;
use crate::status::JobKind;
use crate::WorkflowError;

/// Phases of a single import run, logged as the workflow advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    NotStarted,
    LoggedIn,
    ArchiveUploaded,
    ImportTriggered,
    Polling,
    Finished,
    Errored,
    CleanedUp,
}

/// Runs a full site import from a local archive.
pub async fn run_site_import(
    client: &mut WorkflowClient,
    archive: &Path,
    interval: Duration,
) -> Result<(), WorkflowError> {
    run_import(client, archive, interval, JobKind::SiteImport).await
}

/// Runs a full metadata import from a local archive, with a validation
/// pass before the import proper.
pub async fn run_meta_import(
    client: &mut WorkflowClient,
    archive: &Path,
    interval: Duration,
) -> Result<(), WorkflowError> {
    run_import(client, archive, interval, JobKind::MetaImport).await
}

async fn run_import(
    client: &mut WorkflowClient,
    archive: &Path,
    interval: Duration,
    kind: JobKind,
) -> Result<(), WorkflowError> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| WorkflowError::BadArchiveName(archive.to_path_buf()))?
        .to_string();

    let result = drive(client, &name, archive, interval, kind).await;

    match &result {
        Ok(()) => phase(&name, ImportPhase::Finished),
        Err(e) => {
            warn!(archive = %name, error = %e, "import did not complete");
            phase(&name, ImportPhase::Errored);
        }
    }

    // Compensating cleanup runs on the happy path and on every failure
    // path; its own failures are logged, never surfaced over the result.
    if let Err(e) = cleanup(client, &name, archive, kind).await {
        warn!(archive = %name, error = %e, "cleanup failed");
    }
    phase(&name, ImportPhase::CleanedUp);

    result
}

/// The step chain proper. Any step's failure short-circuits the rest.
async fn drive(
    client: &mut WorkflowClient,
    name: &str,
    archive: &Path,
    interval: Duration,
    kind: JobKind,
) -> Result<(), WorkflowError> {
    phase(name, ImportPhase::NotStarted);

    client.login().await?;
    phase(name, ImportPhase::LoggedIn);

    client.ensure_no_import(name).await?;

    match kind {
        JobKind::SiteImport => {
            client.upload_sites_archive(name, archive).await?;
            phase(name, ImportPhase::ArchiveUploaded);
            client.import_sites(name).await?;
        }
        JobKind::MetaImport => {
            client.upload_meta(name, archive).await?;
            phase(name, ImportPhase::ArchiveUploaded);
            client.validate_meta_import(name).await?;
            phase(name, ImportPhase::Polling);
            client
                .check_import_progress(name, interval, JobKind::MetaValidation)
                .await?;
            client.import_meta(name).await?;
        }
        JobKind::MetaValidation => {
            client.upload_meta(name, archive).await?;
            phase(name, ImportPhase::ArchiveUploaded);
            client.validate_meta_import(name).await?;
        }
    }
    phase(name, ImportPhase::ImportTriggered);

    phase(name, ImportPhase::Polling);
    client.check_import_progress(name, interval, kind).await
}

async fn cleanup(
    client: &WorkflowClient,
    name: &str,
    archive: &Path,
    kind: JobKind,
) -> Result<(), WorkflowError> {
    let remote = match kind {
        JobKind::SiteImport => client.delete_sites_archive(name).await,
        JobKind::MetaImport | JobKind::MetaValidation => client.delete_meta(name).await,
    };

    // Local removal is attempted even when the remote delete failed.
    if archive.exists() {
        tokio::fs::remove_file(archive).await?;
    }
    remote
}

fn phase(name: &str, phase: ImportPhase) {
    info!(archive = name, phase = ?phase, "import phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsync_transport::Transport;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Scripted console: one `(status, body)` per connection, requests
    /// recorded as `METHOD path` lines.
    async fn mock_console(
        script: Vec<(u16, &'static str)>,
    ) -> (String, Arc<Mutex<Vec<String>>>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_srv = Arc::clone(&seen);

        let handle = tokio::spawn(async move {
            let mut script = script.into_iter();
            while let Ok((mut stream, _)) = listener.accept().await {
                let Some((status, body)) = script.next() else { break };

                let mut raw = Vec::new();
                let mut buf = vec![0u8; 16384];
                loop {
                    match tokio::time::timeout(
                        Duration::from_millis(100),
                        stream.read(&mut buf),
                    )
                    .await
                    {
                        Ok(Ok(n)) if n > 0 => raw.extend_from_slice(&buf[..n]),
                        _ => break,
                    }
                }
                let text = String::from_utf8_lossy(&raw);
                let line = text.lines().next().unwrap_or_default();
                let sig = line.rsplit_once(' ').map(|(l, _)| l.to_string());
                seen_srv
                    .lock()
                    .unwrap()
                    .push(sig.unwrap_or_else(|| line.to_string()));

                let resp = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, seen, handle)
    }

    fn client(url: &str) -> WorkflowClient {
        let transport = Transport::new(url, Duration::from_secs(2)).unwrap();
        WorkflowClient::new(transport, "admin", "secret")
    }

    fn temp_archive() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("site.zip");
        std::fs::write(&zip, b"PK").unwrap();
        (dir, zip)
    }

    const TOKEN_PAGE: &str =
        r#"name="csrf_token" value="tok_abcdef1234567890abcdef""#;

    #[tokio::test]
    async fn site_import_happy_path_cleans_up_both_sides() {
        let (dir, zip) = temp_archive();
        let (url, seen, handle) = mock_console(vec![
            (200, TOKEN_PAGE),                        // login
            (200, "Status: Ready"),                   // ensure_no_import
            (200, ""),                                // upload
            (200, ""),                                // dispatch
            (200, "Status: Finished (0 data errors)"),// poll
            (200, ""),                                // staging delete
        ])
        .await;

        let mut wf = client(&url);
        run_site_import(&mut wf, &zip, Duration::from_millis(10))
            .await
            .unwrap();

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 6);
        assert!(requests[2].starts_with("PUT /webdav/impex/instance/site.zip"));
        assert!(requests[5].starts_with("DELETE /webdav/impex/instance/site.zip"));

        // Local temp archive removed as part of cleanup.
        assert!(!zip.exists());
        drop(dir);
        handle.abort();
    }

    #[tokio::test]
    async fn failed_trigger_still_runs_cleanup() {
        let (dir, zip) = temp_archive();
        let (url, seen, handle) = mock_console(vec![
            (200, TOKEN_PAGE),      // login
            (200, "Status: Ready"), // ensure_no_import
            (200, ""),              // upload
            (500, "boom"),          // dispatch fails hard
            (200, ""),              // staging delete still happens
        ])
        .await;

        let mut wf = client(&url);
        let err = run_site_import(&mut wf, &zip, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Transport(_)));

        let requests = seen.lock().unwrap();
        assert!(requests
            .last()
            .unwrap()
            .starts_with("DELETE /webdav/impex/instance/site.zip"));
        assert!(!zip.exists());
        drop(dir);
        handle.abort();
    }

    #[tokio::test]
    async fn running_import_blocks_a_second_one() {
        let (dir, zip) = temp_archive();
        let (url, seen, handle) = mock_console(vec![
            (200, TOKEN_PAGE),        // login
            (200, "Status: Running"), // ensure_no_import fails
            (200, ""),                // cleanup delete
        ])
        .await;

        let mut wf = client(&url);
        let err = run_site_import(&mut wf, &zip, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ImportInProgress(_)));

        // No upload or dispatch was issued before the precondition failed.
        let requests = seen.lock().unwrap();
        assert!(!requests.iter().any(|r| r.starts_with("PUT ")));
        drop(dir);
        handle.abort();
    }
}
