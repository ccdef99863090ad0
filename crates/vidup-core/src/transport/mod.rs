//! HTTP exchange abstraction.
//!
//! The upload engine never talks to an HTTP library directly: it builds an
//! [`HttpRequest`] and hands it to an injected [`HttpTransport`]. Production
//! code uses [`libcurl::CurlTransport`]; tests script responses in memory.

pub mod libcurl;

use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing request. Header names keep the caller's casing.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: Option<&str>) -> Self {
        match token {
            Some(t) if !t.is_empty() => self.header("Authorization", format!("Bearer {}", t)),
            _ => self,
        }
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup (first match).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A completed exchange, whatever its status.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup (first match).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8, truncated for logs and error messages.
    pub fn body_snippet(&self) -> String {
        const MAX: usize = 512;
        let text = String::from_utf8_lossy(&self.body);
        if text.len() <= MAX {
            return text.into_owned();
        }
        let mut end = MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Exchange failed before a status line was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connect or transfer timed out. Retried like a 503.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Connection refused/reset, DNS failure, etc.
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Injected HTTP capability.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let r = HttpResponse::new(308)
            .with_header("range", "bytes=0-99")
            .with_header("Location", "/x");
        assert_eq!(r.header("Range"), Some("bytes=0-99"));
        assert_eq!(r.header("LOCATION"), Some("/x"));
        assert!(r.header("etag").is_none());
        assert!(!r.is_success());
    }

    #[test]
    fn bearer_skips_missing_token() {
        let req = HttpRequest::new(Method::Put, "http://x/").bearer(None);
        assert!(req.header_value("authorization").is_none());
        let req = HttpRequest::new(Method::Put, "http://x/").bearer(Some("abc"));
        assert_eq!(req.header_value("authorization"), Some("Bearer abc"));
    }

    #[test]
    fn body_snippet_truncates_on_char_boundary() {
        let body = "é".repeat(400);
        let snippet = HttpResponse::new(500).with_body(body).body_snippet();
        assert!(snippet.ends_with("..."));
        assert!(snippet.len() <= 515);
    }
}
