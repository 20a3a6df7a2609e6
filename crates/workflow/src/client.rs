//! Workflow client: login, staging transfers, job triggers, polling.

use std::path::Path;
use std::time::Duration;

use cartsync_transport::{RequestSpec, Transport};
use tracing::{debug, info, warn};

use crate::session::{extract_csrf, Session};
use crate::status::{parse_status, JobKind, JobOutcome};
use crate::WorkflowError;

/// Console endpoints. The console speaks HTML; responses are scraped, not
/// parsed.
const LOGIN_PATH: &str = "/admin/login";
const DISPATCH_PATH: &str = "/admin/impex/dispatch";
const STATUS_PATH: &str = "/admin/impex/status";
const ACTIVATE_PATH: &str = "/admin/code/activate";
const SITES_STAGING: &str = "/webdav/impex/instance";
const META_STAGING: &str = "/webdav/impex/meta";

/// Session-authenticated client for import workflows.
///
/// Owns the session state (cookies live in the transport, the CSRF token
/// here); a new client starts with a clean session.
pub struct WorkflowClient {
    transport: Transport,
    username: String,
    password: String,
    session: Session,
}

impl WorkflowClient {
    /// Creates a client over the given transport.
    pub fn new(transport: Transport, username: &str, password: &str) -> Self {
        Self {
            transport,
            username: username.to_string(),
            password: password.to_string(),
            session: Session::default(),
        }
    }

    /// Submits the login form and captures the CSRF token from the
    /// response body.
    ///
    /// The console answers a failed login with an error status, which the
    /// transport surfaces as a hard failure. A success page without a
    /// recognizable token is tolerated; later mutating requests simply
    /// carry no token.
    pub async fn login(&mut self) -> Result<(), WorkflowError> {
        let body = self
            .transport
            .send(&RequestSpec::post_form(
                LOGIN_PATH,
                vec![
                    ("username".into(), self.username.clone()),
                    ("password".into(), self.password.clone()),
                ],
            ))
            .await?;

        match extract_csrf(&body) {
            Some(token) => self.session.set_csrf(token),
            None => warn!("login page carried no csrf token"),
        }
        info!("logged in");
        Ok(())
    }

    /// Token currently held by the session, if any.
    pub fn csrf(&self) -> Option<&str> {
        self.session.csrf()
    }

    /// Uploads a site archive into the import staging area.
    pub async fn upload_sites_archive(
        &self,
        name: &str,
        local: &Path,
    ) -> Result<(), WorkflowError> {
        let target = self.session.with_csrf(&format!("{SITES_STAGING}/{name}"));
        self.transport
            .send(&RequestSpec::put_file(&target, local.to_path_buf()))
            .await?;
        info!(archive = name, "site archive uploaded");
        Ok(())
    }

    /// Removes a site archive from the staging area.
    pub async fn delete_sites_archive(&self, name: &str) -> Result<(), WorkflowError> {
        let target = self.session.with_csrf(&format!("{SITES_STAGING}/{name}"));
        self.transport.send(&RequestSpec::delete(&target)).await?;
        info!(archive = name, "site archive removed");
        Ok(())
    }

    /// Uploads a metadata archive into the meta staging area.
    pub async fn upload_meta(&self, name: &str, local: &Path) -> Result<(), WorkflowError> {
        let target = self.session.with_csrf(&format!("{META_STAGING}/{name}"));
        self.transport
            .send(&RequestSpec::put_file(&target, local.to_path_buf()))
            .await?;
        info!(archive = name, "meta archive uploaded");
        Ok(())
    }

    /// Removes a metadata archive from the staging area.
    pub async fn delete_meta(&self, name: &str) -> Result<(), WorkflowError> {
        let target = self.session.with_csrf(&format!("{META_STAGING}/{name}"));
        self.transport.send(&RequestSpec::delete(&target)).await?;
        info!(archive = name, "meta archive removed");
        Ok(())
    }

    /// Fails when an import is already running.
    ///
    /// Check-then-act: a concurrent workflow could pass this check and
    /// trigger a second import before ours lands. The console is the only
    /// serialization point across processes.
    pub async fn ensure_no_import(&self, name: &str) -> Result<(), WorkflowError> {
        let body = self.fetch_status(name).await?;
        if body.contains("Running") {
            return Err(WorkflowError::ImportInProgress(name.to_string()));
        }
        Ok(())
    }

    /// Triggers a site import. Returns once the trigger request lands, not
    /// once the job finishes.
    pub async fn import_sites(&self, name: &str) -> Result<(), WorkflowError> {
        self.dispatch(name, JobKind::SiteImport).await
    }

    /// Triggers a metadata import.
    pub async fn import_meta(&self, name: &str) -> Result<(), WorkflowError> {
        self.dispatch(name, JobKind::MetaImport).await
    }

    /// Triggers a metadata validation pass.
    pub async fn validate_meta_import(&self, name: &str) -> Result<(), WorkflowError> {
        self.dispatch(name, JobKind::MetaValidation).await
    }

    async fn dispatch(&self, name: &str, kind: JobKind) -> Result<(), WorkflowError> {
        let target = self.session.with_csrf(DISPATCH_PATH);
        self.transport
            .send(&RequestSpec::post_form(
                &target,
                vec![
                    ("job".into(), kind.as_str().into()),
                    ("file".into(), name.into()),
                ],
            ))
            .await?;
        info!(job = kind.as_str(), file = name, "job triggered");
        Ok(())
    }

    /// Polls the job status page until a terminal state.
    ///
    /// Resolves on a clean finish, fails with the scraped detail on an
    /// error finish. There is no client-side deadline: the remote job is
    /// trusted to terminate.
    pub async fn check_import_progress(
        &self,
        name: &str,
        interval: Duration,
        kind: JobKind,
    ) -> Result<(), WorkflowError> {
        loop {
            let body = self.fetch_status(name).await?;
            match parse_status(&body) {
                JobOutcome::Running => {
                    debug!(job = kind.as_str(), file = name, "still running");
                    tokio::time::sleep(interval).await;
                }
                JobOutcome::Finished => {
                    info!(job = kind.as_str(), file = name, "job finished");
                    return Ok(());
                }
                JobOutcome::Error(detail) => {
                    return Err(WorkflowError::JobFailed(detail));
                }
            }
        }
    }

    /// Activates the configured code version. Single-shot; activation is
    /// synchronous on the server side.
    pub async fn activate_code_version(&self, code_version: &str) -> Result<(), WorkflowError> {
        let target = self.session.with_csrf(ACTIVATE_PATH);
        self.transport
            .send(&RequestSpec::post_form(
                &target,
                vec![("version".into(), code_version.into())],
            ))
            .await?;
        info!(code_version, "code version activated");
        Ok(())
    }

    async fn fetch_status(&self, name: &str) -> Result<String, WorkflowError> {
        let target = self
            .session
            .with_csrf(&format!("{STATUS_PATH}?file={name}"));
        Ok(self.transport.send(&RequestSpec::get(&target)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Mock console: serves one scripted body per connection and records
    /// raw request text.
    async fn mock_console(
        bodies: Vec<&'static str>,
    ) -> (String, Arc<Mutex<Vec<String>>>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_srv = Arc::clone(&seen);

        let handle = tokio::spawn(async move {
            let mut bodies = bodies.into_iter();
            while let Ok((mut stream, _)) = listener.accept().await {
                let Some(body) = bodies.next() else { break };

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
                seen_srv
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&raw).into_owned());

                let resp = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
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

    const TOKEN_PAGE: &str =
        r#"<input type="hidden" name="csrf_token" value="tok_abcdef1234567890abcdef"/>"#;

    #[tokio::test]
    async fn login_captures_csrf_token() {
        let (url, _, handle) = mock_console(vec![TOKEN_PAGE]).await;

        let mut wf = client(&url);
        assert!(wf.csrf().is_none());
        wf.login().await.unwrap();
        assert_eq!(wf.csrf().unwrap(), "tok_abcdef1234567890abcdef");
        handle.abort();
    }

    #[tokio::test]
    async fn mutating_request_before_login_has_no_token() {
        let (url, seen, handle) = mock_console(vec![""]).await;

        let wf = client(&url);
        wf.import_sites("site.zip").await.unwrap();

        let requests = seen.lock().unwrap();
        assert!(requests[0].starts_with("POST /admin/impex/dispatch HTTP"));
        assert!(!requests[0].contains("csrf_token"));
        handle.abort();
    }

    #[tokio::test]
    async fn mutating_request_after_login_embeds_token() {
        let (url, seen, handle) = mock_console(vec![TOKEN_PAGE, ""]).await;

        let mut wf = client(&url);
        wf.login().await.unwrap();
        wf.import_sites("site.zip").await.unwrap();

        let requests = seen.lock().unwrap();
        assert!(requests[1].starts_with(
            "POST /admin/impex/dispatch?csrf_token=tok_abcdef1234567890abcdef"
        ));
        handle.abort();
    }

    #[tokio::test]
    async fn short_token_is_not_accepted() {
        let (url, seen, handle) =
            mock_console(vec![r#"name="csrf_token" value="short""#, ""]).await;

        let mut wf = client(&url);
        wf.login().await.unwrap();
        assert!(wf.csrf().is_none());

        wf.import_sites("site.zip").await.unwrap();
        let requests = seen.lock().unwrap();
        assert!(!requests[1].contains("csrf_token="));
        handle.abort();
    }

    #[tokio::test]
    async fn progress_polls_until_clean_finish() {
        let (url, seen, handle) = mock_console(vec![
            "Status: Running",
            "Status: Running",
            "Status: Finished (0 data errors)",
        ])
        .await;

        let wf = client(&url);
        wf.check_import_progress("site.zip", Duration::from_millis(10), JobKind::SiteImport)
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().len(), 3);
        handle.abort();
    }

    #[tokio::test]
    async fn progress_fails_on_error_status() {
        let (url, seen, handle) =
            mock_console(vec!["Status: Running", "Status: Error: import exploded"]).await;

        let wf = client(&url);
        let err = wf
            .check_import_progress("site.zip", Duration::from_millis(10), JobKind::SiteImport)
            .await
            .unwrap_err();

        match err {
            WorkflowError::JobFailed(detail) => assert!(detail.contains("import exploded")),
            other => panic!("expected JobFailed, got {other:?}"),
        }
        assert_eq!(seen.lock().unwrap().len(), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn progress_fails_on_data_errors() {
        let (url, _, handle) =
            mock_console(vec!["Status: Finished (2 data errors)"]).await;

        let wf = client(&url);
        let err = wf
            .check_import_progress("site.zip", Duration::from_millis(10), JobKind::SiteImport)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::JobFailed(_)));
        handle.abort();
    }

    #[tokio::test]
    async fn ensure_no_import_rejects_running_job() {
        let (url, _, handle) = mock_console(vec!["Status: Running"]).await;

        let wf = client(&url);
        let err = wf.ensure_no_import("site.zip").await.unwrap_err();
        assert!(matches!(err, WorkflowError::ImportInProgress(_)));
        handle.abort();
    }

    #[tokio::test]
    async fn ensure_no_import_passes_when_idle() {
        let (url, _, handle) =
            mock_console(vec!["Status: Finished (0 data errors)"]).await;

        let wf = client(&url);
        wf.ensure_no_import("site.zip").await.unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn upload_targets_staging_area() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("site.zip");
        std::fs::write(&zip, b"PK").unwrap();

        let (url, seen, handle) = mock_console(vec![""]).await;
        let wf = client(&url);
        wf.upload_sites_archive("site.zip", &zip).await.unwrap();

        let requests = seen.lock().unwrap();
        assert!(requests[0].starts_with("PUT /webdav/impex/instance/site.zip"));
        handle.abort();
    }

    #[tokio::test]
    async fn activation_posts_the_code_version() {
        let (url, seen, handle) = mock_console(vec![""]).await;
        let wf = client(&url);
        wf.activate_code_version("version1").await.unwrap();

        let requests = seen.lock().unwrap();
        assert!(requests[0].starts_with("POST /admin/code/activate"));
        assert!(requests[0].contains("version=version1"));
        handle.abort();
    }
}
