//! Chunk range math and the `Content-Range` / `Range` header formats.

/// A byte range [start, end) (half-open) of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
    /// Total size of the file this chunk belongs to.
    pub total: u64,
}

impl Chunk {
    /// Next chunk starting exactly at `offset`, at most `chunk_size` bytes long.
    ///
    /// Returns `None` once `offset >= total`, except for an empty file, which
    /// still needs one (empty) request to be finalized.
    pub fn next(offset: u64, total: u64, chunk_size: u64) -> Option<Chunk> {
        if total == 0 {
            return (offset == 0).then_some(Chunk {
                start: 0,
                end: 0,
                total: 0,
            });
        }
        if offset >= total {
            return None;
        }
        let end = offset.saturating_add(chunk_size.max(1)).min(total);
        Some(Chunk {
            start: offset,
            end,
            total,
        })
    }

    /// Length of this chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if this chunk carries the last byte of the file.
    pub fn is_last(&self) -> bool {
        self.end >= self.total
    }

    /// `Content-Range` value (inclusive end): `bytes start-(end-1)/total`.
    pub fn content_range_header_value(&self) -> String {
        if self.is_empty() {
            format!("bytes */{}", self.total)
        } else {
            format!("bytes {}-{}/{}", self.start, self.end - 1, self.total)
        }
    }
}

/// Parse a resume `Range` header (`bytes=0-N`) into the persisted byte count `N + 1`.
///
/// Uploads are sequential so the persisted range always starts at zero;
/// anything else is rejected.
pub fn parse_persisted_range(value: &str) -> Option<u64> {
    let value = value.trim();
    let rest = value
        .strip_prefix("bytes=")
        .or_else(|| value.strip_prefix("bytes "))?;
    let (start, end) = rest.trim().split_once('-')?;
    if start.trim().parse::<u64>().ok()? != 0 {
        return None;
    }
    end.trim().parse::<u64>().ok()?.checked_add(1)
}
