//! Job status scraping from console status pages.

/// Remote job flavor, used to address the right status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    SiteImport,
    MetaImport,
    MetaValidation,
}

impl JobKind {
    /// Job identifier used in dispatch and status requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SiteImport => "site-import",
            JobKind::MetaImport => "meta-import",
            JobKind::MetaValidation => "meta-validation",
        }
    }
}

/// Parsed outcome of one status-page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// No terminal marker yet; keep polling.
    Running,
    /// Clean terminal state.
    Finished,
    /// Terminal error state, with whatever detail the page carried.
    Error(String),
}

/// Scrapes a status page body.
///
/// `Finished`/`Success` are terminal; a nonzero data-error count turns a
/// finished job into an error. An `Error`-prefixed status is terminal with
/// the surrounding text as detail. Anything else counts as still running.
pub fn parse_status(body: &str) -> JobOutcome {
    if body.contains("Finished") || body.contains("Success") {
        return match parse_data_errors(body) {
            Some(n) if n > 0 => {
                JobOutcome::Error(format!("finished with {n} data errors"))
            }
            _ => JobOutcome::Finished,
        };
    }

    if let Some(idx) = body.find("Error") {
        let detail: String = body[idx..].chars().take(200).collect();
        return JobOutcome::Error(detail.trim().to_string());
    }

    JobOutcome::Running
}

/// Finds a `<n> data error` marker and returns the count.
fn parse_data_errors(body: &str) -> Option<u32> {
    let idx = body.find("data error")?;
    let digits: String = body[..idx]
        .chars()
        .rev()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let number: String = digits.chars().rev().collect();
    number.parse().ok()
}
