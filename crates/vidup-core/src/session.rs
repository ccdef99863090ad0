//! Upload session: identity, remote location, progress cursor and state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Client-assigned id, known before the server confirms anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let n = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        SessionId(format!("upload-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of an upload.
///
/// `Queued -> Uploading -> {Paused, Error, Cancelled, Complete}`,
/// `Paused -> Uploading`, `Error -> Uploading | Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Queued,
    Uploading,
    Paused,
    Error,
    Cancelled,
    Complete,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Cancelled | UploadState::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Queued => "queued",
            UploadState::Uploading => "uploading",
            UploadState::Paused => "paused",
            UploadState::Error => "error",
            UploadState::Cancelled => "cancelled",
            UploadState::Complete => "complete",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable key/value fields sent with the session-open request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMetadata(BTreeMap<String, String>);

impl UploadMetadata {
    /// Metadata with the mandatory `filename` field.
    pub fn new(filename: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("filename".to_string(), filename.into());
        Self(fields)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `application/x-www-form-urlencoded` body.
    pub fn to_form_body(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in self.iter() {
            ser.append_pair(k, v);
        }
        ser.finish()
    }
}

/// Identifiers of the created video, from the final `200/201` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default, rename = "shortUUID")]
    pub short_uuid: Option<String>,
}

/// One resumable transfer.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub session_id: SessionId,
    /// Set once by session open; replaced only by a server redirect.
    pub remote_location: Option<String>,
    pub total_size: u64,
    acknowledged_offset: u64,
    pub metadata: UploadMetadata,
    pub state: UploadState,
}

impl UploadSession {
    pub fn new(total_size: u64, metadata: UploadMetadata) -> Self {
        Self {
            session_id: SessionId::generate(),
            remote_location: None,
            total_size,
            acknowledged_offset: 0,
            metadata,
            state: UploadState::Queued,
        }
    }

    pub fn acknowledged_offset(&self) -> u64 {
        self.acknowledged_offset
    }

    /// Record a server-confirmed offset. Never moves backwards, never passes `total_size`.
    /// Returns true if the offset changed.
    pub fn acknowledge(&mut self, offset: u64) -> bool {
        let offset = offset.min(self.total_size);
        if offset <= self.acknowledged_offset {
            return false;
        }
        self.acknowledged_offset = offset;
        true
    }

    pub fn is_opened(&self) -> bool {
        self.remote_location.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledge_is_monotonic_and_clamped() {
        let mut s = UploadSession::new(100, UploadMetadata::new("a.mp4"));
        assert!(s.acknowledge(40));
        assert!(!s.acknowledge(30));
        assert_eq!(s.acknowledged_offset(), 40);
        assert!(s.acknowledge(500));
        assert_eq!(s.acknowledged_offset(), 100);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn metadata_form_body_is_encoded() {
        let m = UploadMetadata::new("my clip.mp4")
            .with("channelId", "3")
            .with("name", "Hello & bye");
        let body = m.to_form_body();
        assert_eq!(body, "channelId=3&filename=my+clip.mp4&name=Hello+%26+bye");
        assert_eq!(m.get("channelId"), Some("3"));
    }

    #[test]
    fn result_parses_camel_case() {
        let r: UploadResult =
            serde_json::from_str(r#"{"id":7,"uuid":"u-1","shortUUID":"s1"}"#).unwrap();
        assert_eq!(r.id, Some(7));
        assert_eq!(r.short_uuid.as_deref(), Some("s1"));
    }
}
