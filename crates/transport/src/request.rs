//! Request description consumed by [`crate::Transport`].

use std::fmt;
use std::path::PathBuf;

/// HTTP method of a logical operation.
///
/// Includes the WebDAV extension methods the remote tree speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Delete,
    Post,
    Propfind,
    Mkcol,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Post => "POST",
            Method::Propfind => "PROPFIND",
            Method::Mkcol => "MKCOL",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Post => reqwest::Method::POST,
            // The WebDAV extension methods have no named constants; their
            // tokens are statically valid, so the fallback arm never fires.
            Method::Propfind | Method::Mkcol => {
                reqwest::Method::from_bytes(method.as_str().as_bytes())
                    .unwrap_or(reqwest::Method::GET)
            }
        }
    }
}

/// Body source for upload-type operations.
///
/// PUT bodies come either from a local file (streamed) or from in-memory
/// text, selected by which variant the caller provides.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    None,
    File(PathBuf),
    Text(String),
}

/// One logical HTTP operation.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    /// Server-relative target (`/on/...`) or a full URL.
    pub target: String,
    /// Form fields for POST operations.
    pub form: Option<Vec<(String, String)>>,
    pub body: Body,
}

impl RequestSpec {
    pub fn get(target: impl Into<String>) -> Self {
        Self::bare(Method::Get, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::bare(Method::Delete, target)
    }

    pub fn mkcol(target: impl Into<String>) -> Self {
        Self::bare(Method::Mkcol, target)
    }

    pub fn propfind(target: impl Into<String>) -> Self {
        Self::bare(Method::Propfind, target)
    }

    /// PUT streaming the body from a local file.
    pub fn put_file(target: impl Into<String>, path: PathBuf) -> Self {
        Self {
            method: Method::Put,
            target: target.into(),
            form: None,
            body: Body::File(path),
        }
    }

    /// PUT with an in-memory body.
    pub fn put_text(target: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            target: target.into(),
            form: None,
            body: Body::Text(content.into()),
        }
    }

    /// Form-encoded POST.
    pub fn post_form(target: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            target: target.into(),
            form: Some(form),
            body: Body::None,
        }
    }

    fn bare(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            form: None,
            body: Body::None,
        }
    }

    /// Short `METHOD target` signature used in log lines.
    pub fn signature(&self) -> String {
        format!("{} {}", self.method, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_wire_names() {
        assert_eq!(Method::Propfind.as_str(), "PROPFIND");
        assert_eq!(Method::Mkcol.as_str(), "MKCOL");
        assert_eq!(Method::Delete.as_str(), "DELETE");
    }

    #[test]
    fn methods_convert_without_losing_webdav_tokens() {
        assert_eq!(reqwest::Method::from(Method::Get), reqwest::Method::GET);
        assert_eq!(reqwest::Method::from(Method::Propfind).as_str(), "PROPFIND");
        assert_eq!(reqwest::Method::from(Method::Mkcol).as_str(), "MKCOL");
    }

    #[test]
    fn put_file_selects_file_body() {
        let spec = RequestSpec::put_file("/a", PathBuf::from("/tmp/x"));
        assert!(matches!(spec.body, Body::File(_)));
        assert_eq!(spec.method, Method::Put);
    }

    #[test]
    fn signature_format() {
        let spec = RequestSpec::get("/cartridges/app");
        assert_eq!(spec.signature(), "GET /cartridges/app");
    }
}
