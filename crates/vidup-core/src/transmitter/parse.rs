//! Interpret upload endpoint responses.

use serde::Deserialize;

use super::{ChunkOutcome, TransmitFailure};
use crate::chunk::{parse_persisted_range, Chunk};
use crate::session::UploadResult;
use crate::transport::HttpResponse;

/// `308 Resume Incomplete`: the server kept a prefix and wants more.
pub const RESUME_INCOMPLETE: u16 = 308;

#[derive(Deserialize)]
struct CreatedBody {
    video: Option<UploadResult>,
}

/// Resolve a possibly relative `Location` against the URL the request went to.
pub(crate) fn resolve_location(base: &str, location: &str) -> Result<String, TransmitFailure> {
    let location = location.trim();
    if location.is_empty() {
        return Err(TransmitFailure::InvalidSession("empty Location header".into()));
    }
    let base = url::Url::parse(base)
        .map_err(|e| TransmitFailure::InvalidSession(format!("bad request URL {}: {}", base, e)))?;
    base.join(location)
        .map(String::from)
        .map_err(|e| TransmitFailure::InvalidSession(format!("bad Location {}: {}", location, e)))
}

/// Session-open response: must be 2xx with a `Location`.
pub(crate) fn interpret_open_response(
    endpoint: &str,
    response: &HttpResponse,
) -> Result<String, TransmitFailure> {
    if !response.is_success() {
        return Err(TransmitFailure::from_response(response));
    }
    let location = response.header("Location").ok_or_else(|| {
        TransmitFailure::InvalidSession(format!(
            "HTTP {} without Location header",
            response.status
        ))
    })?;
    resolve_location(endpoint, location)
}

/// Final body: `{"video": {...}}`, a bare result object, or nothing at all.
pub(crate) fn parse_result(body: &[u8]) -> UploadResult {
    if body.iter().all(u8::is_ascii_whitespace) {
        return UploadResult::default();
    }
    if let Ok(CreatedBody { video: Some(v) }) = serde_json::from_slice::<CreatedBody>(body) {
        return v;
    }
    match serde_json::from_slice::<UploadResult>(body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("unparseable upload result body: {}", e);
            UploadResult::default()
        }
    }
}

/// Chunk response.
///
/// The echoed `Range` wins over what we sent: a server may keep only part of
/// a chunk, and the next chunk must start where it stopped.
pub(crate) fn interpret_chunk_response(
    response: &HttpResponse,
    chunk: &Chunk,
    current_location: &str,
) -> Result<ChunkOutcome, TransmitFailure> {
    let status = response.status;
    if status != RESUME_INCOMPLETE && !response.is_success() {
        return Err(TransmitFailure::from_response(response));
    }

    let range = response.header("Range");
    let offset = match range {
        Some(value) => match parse_persisted_range(value) {
            Some(n) => n.min(chunk.total),
            None => return Err(TransmitFailure::from_response(response)),
        },
        None if status == RESUME_INCOMPLETE => 0,
        None if chunk.is_last() => {
            return Ok(ChunkOutcome::Complete(parse_result(&response.body)));
        }
        None => chunk.end,
    };

    if let Some(loc) = response.header("Location") {
        let loc = resolve_location(current_location, loc)?;
        if loc != current_location {
            return Ok(ChunkOutcome::Redirect {
                location: loc,
                offset,
            });
        }
    }
    Ok(ChunkOutcome::Accepted { offset })
}
