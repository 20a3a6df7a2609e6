//! Transport implementation: one logical operation, bounded retry.

use std::time::Duration;

use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

use crate::request::{Body, Method, RequestSpec};
use crate::TransportError;

/// HTTP transport bound to one remote instance.
///
/// Credentials and base URL are fixed at construction; every call through
/// [`Transport::execute`] is a single logical transfer.
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

/// Per-attempt outcome classification. Only `Transient` consumes a retry.
enum AttemptError {
    Transient(reqwest::Error),
    Fatal(TransportError),
}

impl Transport {
    /// Creates a transport for the given base URL.
    ///
    /// The timeout applies per underlying request, independent of how long
    /// the overall retried operation takes. A cookie store is always
    /// enabled so session-authenticated callers can share the transport.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: None,
        })
    }

    /// Attaches basic-auth credentials sent with every request.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Some((username.to_string(), password.to_string()));
        self
    }

    /// Base URL this transport is bound to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Executes `spec` with the default retry budget.
    pub async fn send(&self, spec: &RequestSpec) -> Result<String, TransportError> {
        self.execute(spec, crate::MAX_ATTEMPTS, crate::RETRY_DELAY).await
    }

    /// Executes one logical operation with an explicit retry budget.
    ///
    /// Transient network faults sleep `retry_delay` and retry until
    /// `attempts_left` runs out. HTTP-level failures and local I/O faults
    /// are terminal on first occurrence. A 404 response resolves
    /// successfully for DELETE (idempotent removal) and fails for every
    /// other method.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        mut attempts_left: u32,
        retry_delay: Duration,
    ) -> Result<String, TransportError> {
        loop {
            if attempts_left == 0 {
                error!(op = %spec.signature(), "retry budget exhausted");
                return Err(TransportError::RetriesExhausted {
                    method: spec.method,
                    target: spec.target.clone(),
                });
            }

            debug!(op = %spec.signature(), attempts_left, "issuing request");

            match self.attempt(spec).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Fatal(e)) => {
                    error!(op = %spec.signature(), error = %e, "request failed");
                    return Err(e);
                }
                Err(AttemptError::Transient(e)) => {
                    attempts_left -= 1;
                    warn!(
                        op = %spec.signature(),
                        attempts_left,
                        error = %e,
                        "transient network fault, retrying"
                    );
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    /// Issues a single underlying request and classifies the outcome.
    async fn attempt(&self, spec: &RequestSpec) -> Result<String, AttemptError> {
        let url = if spec.target.starts_with("http://") || spec.target.starts_with("https://") {
            spec.target.clone()
        } else {
            format!("{}{}", self.base_url, spec.target)
        };

        let mut req = self.http.request(spec.method.into(), &url);

        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass));
        }

        if let Some(form) = &spec.form {
            req = req.form(form);
        }

        match &spec.body {
            Body::None => {}
            Body::Text(content) => {
                req = req.body(content.clone());
            }
            Body::File(path) => {
                // Local read faults are not network faults: fail without
                // consuming a retry. The file is re-opened on every attempt
                // so a retried request streams from the start.
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| AttemptError::Fatal(TransportError::Io(e)))?;
                req = req.body(reqwest::Body::wrap_stream(ReaderStream::new(file)));
            }
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return Err(classify(e)),
        };

        let status = resp.status();

        if status.as_u16() == 404 {
            // Idempotent delete: removing something already gone is done.
            if spec.method == Method::Delete {
                return Ok(String::new());
            }
            return Err(AttemptError::Fatal(TransportError::Status {
                method: spec.method,
                target: spec.target.clone(),
                code: 404,
            }));
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(AttemptError::Fatal(TransportError::Status {
                method: spec.method,
                target: spec.target.clone(),
                code: status.as_u16(),
            }));
        }

        match resp.text().await {
            Ok(body) => Ok(body),
            Err(e) => Err(classify(e)),
        }
    }
}

/// Splits a reqwest error into the transient class (retried) and everything
/// else (terminal).
fn classify(err: reqwest::Error) -> AttemptError {
    if is_transient(&err) {
        AttemptError::Transient(err)
    } else {
        AttemptError::Fatal(TransportError::Request(err))
    }
}

/// The closed set of network faults worth retrying: timeouts, connection
/// setup failures (covers DNS and refused connections), and mid-stream
/// socket errors.
fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }

    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            return matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::BrokenPipe
                    | ErrorKind::TimedOut
                    | ErrorKind::UnexpectedEof
            );
        }
        source = inner.source();
    }

    false
}
