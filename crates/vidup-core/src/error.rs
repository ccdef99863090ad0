//! Upload error taxonomy reported through the event bus and controller calls.

use crate::quota::QuotaRejection;

/// User-visible upload failure.
///
/// `Clone` so the same value can ride on every [`crate::events::UploadEvent`]
/// published after the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// Admission check failed; no request was made to the upload endpoint.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(QuotaRejection),
    /// Server rejected the file format (HTTP 415). The upload is cancelled.
    #[error("unsupported media type")]
    UnsupportedMediaType,
    /// Server answered 401 again after the access token was refreshed, or refresh failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// HTTP 403; never retried.
    #[error("forbidden")]
    Forbidden,
    /// Retry budget exhausted or a non-retryable status. `status` is `None` for transport failures.
    #[error("transfer failed ({})", describe_status(.status))]
    TransferFailed { status: Option<u16>, message: String },
    /// Session handshake was malformed (e.g. no `Location` header).
    #[error("invalid session response: {0}")]
    InvalidSessionResponse(String),
    /// Upload was cancelled by the user.
    #[error("upload cancelled")]
    Cancelled,
    /// Another upload is already active on this controller.
    #[error("an upload is already in progress")]
    Busy,
    /// Reading the local file failed.
    #[error("source read failed: {0}")]
    Source(String),
    /// The quota collaborator could not report current usage.
    #[error("quota lookup failed: {0}")]
    QuotaLookup(String),
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {}", code),
        None => "no response".to_string(),
    }
}

impl UploadError {
    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::UnsupportedMediaType => Some(415),
            UploadError::AuthenticationFailed(_) => Some(401),
            UploadError::Forbidden => Some(403),
            UploadError::TransferFailed { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_failed_display_mentions_status() {
        let e = UploadError::TransferFailed {
            status: Some(500),
            message: String::new(),
        };
        assert_eq!(e.to_string(), "transfer failed (HTTP 500)");
        let e = UploadError::TransferFailed {
            status: None,
            message: "timeout".into(),
        };
        assert_eq!(e.to_string(), "transfer failed (no response)");
        assert_eq!(e.status(), None);
    }

    #[test]
    fn status_for_taxonomy() {
        assert_eq!(UploadError::Forbidden.status(), Some(403));
        assert_eq!(UploadError::UnsupportedMediaType.status(), Some(415));
        assert_eq!(UploadError::Cancelled.status(), None);
    }
}
