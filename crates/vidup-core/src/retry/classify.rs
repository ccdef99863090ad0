//! Classify HTTP status codes and transport failures into retry policy error kinds.

use crate::retry::policy::ErrorKind;
use crate::transport::TransportError;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        415 => ErrorKind::UnsupportedMediaType,
        503 => ErrorKind::Unavailable,
        0..=399 | 401..=500 => ErrorKind::Retryable,
        _ => ErrorKind::Fatal,
    }
}

/// Classify a transport failure. Timeouts count as 503; anything else as "no response" (status 0).
pub fn classify_transport_error(e: &TransportError) -> ErrorKind {
    match e {
        TransportError::Timeout(_) => ErrorKind::Unavailable,
        TransportError::Connection(_) | TransportError::Other(_) => classify_http_status(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_statuses() {
        assert_eq!(classify_http_status(401), ErrorKind::Unauthorized);
        assert_eq!(classify_http_status(403), ErrorKind::Forbidden);
        assert_eq!(classify_http_status(415), ErrorKind::UnsupportedMediaType);
        assert_eq!(classify_http_status(503), ErrorKind::Unavailable);
    }

    #[test]
    fn generic_band() {
        assert_eq!(classify_http_status(0), ErrorKind::Retryable);
        assert_eq!(classify_http_status(404), ErrorKind::Retryable);
        assert_eq!(classify_http_status(429), ErrorKind::Retryable);
        assert_eq!(classify_http_status(500), ErrorKind::Retryable);
    }

    #[test]
    fn outside_band_is_fatal() {
        assert_eq!(classify_http_status(400), ErrorKind::Fatal);
        assert_eq!(classify_http_status(502), ErrorKind::Fatal);
        assert_eq!(classify_http_status(504), ErrorKind::Fatal);
    }

    #[test]
    fn timeout_treated_as_unavailable() {
        assert_eq!(
            classify_transport_error(&TransportError::Timeout("t".into())),
            ErrorKind::Unavailable
        );
        assert_eq!(
            classify_transport_error(&TransportError::Connection("c".into())),
            ErrorKind::Retryable
        );
    }
}
