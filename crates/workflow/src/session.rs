//! Session state: the CSRF token scraped from an authenticated page.

use tracing::debug;

/// Minimum accepted token length. Guards against false matches when the
/// page happens to mention the token's field name in prose.
pub const MIN_TOKEN_LEN: usize = 20;

/// Per-client session state.
///
/// Unset until a successful login parse; cleared only by constructing a
/// new client. Session expiry is not auto-recovered: a request made after
/// the server dropped the session fails like any other hard failure.
#[derive(Debug, Default)]
pub(crate) struct Session {
    csrf: Option<String>,
}

impl Session {
    pub(crate) fn set_csrf(&mut self, token: String) {
        debug!(len = token.len(), "csrf token captured");
        self.csrf = Some(token);
    }

    pub(crate) fn csrf(&self) -> Option<&str> {
        self.csrf.as_deref()
    }

    /// Appends the token as a query parameter on mutating requests.
    pub(crate) fn with_csrf(&self, target: &str) -> String {
        match &self.csrf {
            Some(token) => {
                let sep = if target.contains('?') { '&' } else { '?' };
                format!("{target}{sep}csrf_token={token}")
            }
            None => target.to_string(),
        }
    }
}

/// Scans a page body for an embedded CSRF token.
///
/// Looks for runs of token characters following a `csrf_token` marker and
/// accepts the first one of at least [`MIN_TOKEN_LEN`] characters.
pub fn extract_csrf(body: &str) -> Option<String> {
    let mut rest = body;
    while let Some(idx) = rest.find("csrf_token") {
        let tail = &rest[idx + "csrf_token".len()..];

        let mut current = String::new();
        for ch in tail.chars().take(200) {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                current.push(ch);
            } else {
                if current.len() >= MIN_TOKEN_LEN {
                    return Some(current);
                }
                current.clear();
            }
        }
        if current.len() >= MIN_TOKEN_LEN {
            return Some(current);
        }

        rest = tail;
    }
    None
}
