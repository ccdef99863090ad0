//! One HTTP exchange at a time against the resumable upload endpoint.
//!
//! The transmitter builds requests and interprets responses; it never
//! retries. Every failure goes back to the controller, which asks the retry
//! policy what to do.

mod parse;

use std::sync::Arc;

use crate::chunk::Chunk;
use crate::retry::{classify_http_status, classify_transport_error, ErrorKind};
use crate::session::{UploadMetadata, UploadResult, UploadSession};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};

pub use parse::RESUME_INCOMPLETE;

/// Successful chunk exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Server persisted bytes [0, offset); continue from there.
    Accepted { offset: u64 },
    /// Server moved the session; continue at `location` from `offset`.
    Redirect { location: String, offset: u64 },
    /// Whole file accepted.
    Complete(UploadResult),
}

/// Failed exchange, handed to the retry policy by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitFailure {
    /// Server answered with an error status.
    Http { status: u16, body: String },
    /// No response (timeout, connection failure).
    Transport(TransportError),
    /// Malformed handshake; never retried.
    InvalidSession(String),
}

impl TransmitFailure {
    fn from_response(response: &HttpResponse) -> Self {
        TransmitFailure::Http {
            status: response.status,
            body: response.body_snippet(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransmitFailure::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Retry classification; `None` for failures that must never be retried.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TransmitFailure::Http { status, .. } => Some(classify_http_status(*status)),
            TransmitFailure::Transport(e) => Some(classify_transport_error(e)),
            TransmitFailure::InvalidSession(_) => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            TransmitFailure::Http { status, body } if body.is_empty() => format!("HTTP {}", status),
            TransmitFailure::Http { status, body } => format!("HTTP {}: {}", status, body),
            TransmitFailure::Transport(e) => e.to_string(),
            TransmitFailure::InvalidSession(m) => m.clone(),
        }
    }
}

pub struct ChunkTransmitter {
    transport: Arc<dyn HttpTransport>,
}

impl ChunkTransmitter {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, TransmitFailure> {
        self.transport
            .execute(request)
            .await
            .map_err(TransmitFailure::Transport)
    }

    /// Open a session. Total length and MIME type are declared here, once.
    /// Returns the absolute session URL from `Location`.
    pub async fn open_session(
        &self,
        endpoint: &str,
        total_size: u64,
        mime_type: &str,
        metadata: &UploadMetadata,
        token: Option<&str>,
    ) -> Result<String, TransmitFailure> {
        let request = HttpRequest::new(Method::Post, endpoint)
            .header("X-Upload-Content-Length", total_size.to_string())
            .header("X-Upload-Content-Type", mime_type)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .bearer(token)
            .body(metadata.to_form_body().into_bytes());
        let response = self.exchange(request).await?;
        let location = parse::interpret_open_response(endpoint, &response)?;
        tracing::info!(%location, total_size, "upload session opened");
        Ok(location)
    }

    /// Send `bytes` as `chunk` to the session's current location.
    pub async fn send(
        &self,
        session: &UploadSession,
        chunk: &Chunk,
        bytes: Vec<u8>,
        token: Option<&str>,
    ) -> Result<ChunkOutcome, TransmitFailure> {
        let location = session
            .remote_location
            .as_deref()
            .ok_or_else(|| TransmitFailure::InvalidSession("session not opened".into()))?;
        debug_assert_eq!(bytes.len() as u64, chunk.len());
        let request = HttpRequest::new(Method::Put, location)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Range", chunk.content_range_header_value())
            .bearer(token)
            .body(bytes);
        let response = self.exchange(request).await?;
        tracing::debug!(
            session = %session.session_id,
            status = response.status,
            range = %chunk.content_range_header_value(),
            "chunk response"
        );
        parse::interpret_chunk_response(&response, chunk, location)
    }

    /// Abort a server-side session (`DELETE <location>`).
    pub async fn delete_session(&self, location: &str, token: Option<&str>) -> Result<(), TransmitFailure> {
        let request = HttpRequest::new(Method::Delete, location).bearer(token);
        let response = self.exchange(request).await?;
        if response.is_success() || response.status == 404 {
            return Ok(());
        }
        Err(TransmitFailure::from_response(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        response: HttpResponse,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait::async_trait]
    impl HttpTransport for Recorder {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn recorder(response: HttpResponse) -> Arc<Recorder> {
        Arc::new(Recorder {
            response,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn open_declares_length_and_type() {
        let rec = recorder(HttpResponse::new(201).with_header("Location", "/s?upload_id=1"));
        let tx = ChunkTransmitter::new(rec.clone());
        let meta = UploadMetadata::new("a.mp4").with("channelId", "2");
        let loc = tx
            .open_session("http://h/api/v1/videos/upload-resumable", 1234, "video/mp4", &meta, Some("t"))
            .await
            .unwrap();
        assert_eq!(loc, "http://h/s?upload_id=1");
        let seen = rec.seen.lock().unwrap();
        let req = &seen[0];
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.header_value("x-upload-content-length"), Some("1234"));
        assert_eq!(req.header_value("x-upload-content-type"), Some("video/mp4"));
        assert_eq!(req.header_value("authorization"), Some("Bearer t"));
        assert_eq!(req.body, b"channelId=2&filename=a.mp4".to_vec());
    }

    #[tokio::test]
    async fn send_puts_content_range_without_declaring_type_again() {
        let rec = recorder(HttpResponse::new(308).with_header("Range", "bytes=0-3"));
        let tx = ChunkTransmitter::new(rec.clone());
        let mut session = UploadSession::new(10, UploadMetadata::new("a"));
        session.remote_location = Some("http://h/s?upload_id=1".into());
        let chunk = Chunk::next(0, 10, 4).unwrap();
        let out = tx.send(&session, &chunk, vec![1, 2, 3, 4], None).await.unwrap();
        assert_eq!(out, ChunkOutcome::Accepted { offset: 4 });
        let seen = rec.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::Put);
        assert_eq!(seen[0].url, "http://h/s?upload_id=1");
        assert_eq!(seen[0].header_value("content-range"), Some("bytes 0-3/10"));
        assert!(seen[0].header_value("x-upload-content-type").is_none());
        assert!(seen[0].header_value("authorization").is_none());
    }

    #[tokio::test]
    async fn send_without_location_is_invalid_session() {
        let tx = ChunkTransmitter::new(recorder(HttpResponse::new(200)));
        let session = UploadSession::new(10, UploadMetadata::new("a"));
        let chunk = Chunk::next(0, 10, 4).unwrap();
        let err = tx.send(&session, &chunk, vec![0; 4], None).await.unwrap_err();
        assert!(matches!(err, TransmitFailure::InvalidSession(_)));
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn failure_kinds() {
        let f = TransmitFailure::Http {
            status: 503,
            body: String::new(),
        };
        assert_eq!(f.kind(), Some(ErrorKind::Unavailable));
        assert_eq!(f.message(), "HTTP 503");
        let f = TransmitFailure::Transport(TransportError::Timeout("slow".into()));
        assert_eq!(f.kind(), Some(ErrorKind::Unavailable));
        assert_eq!(f.status(), None);
    }
}
