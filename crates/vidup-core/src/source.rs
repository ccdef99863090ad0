//! The file handed to `start()`: name, MIME type, size and ranged reads.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Debug, Clone)]
enum Data {
    Memory(Arc<[u8]>),
    Disk(PathBuf),
}

/// Source file of an upload. Cheap to clone; the size is fixed at construction.
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    mime_type: String,
    size: u64,
    data: Data,
}

impl UploadFile {
    /// In-memory file (tests, generated content).
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            data: Data::Memory(bytes),
        }
    }

    /// File on disk; size is read now and must not change during the upload.
    pub async fn open(path: impl AsRef<Path>, mime_type: Option<&str>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let mime_type = mime_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_mime_type(&name));
        Ok(Self {
            name,
            mime_type,
            size: meta.len(),
            data: Data::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read bytes [start, end). Fails if the file got shorter since it was opened.
    pub async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
        if start > end || end > self.size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("range {}..{} outside file of {} bytes", start, end, self.size),
            ));
        }
        let len = (end - start) as usize;
        match &self.data {
            Data::Memory(bytes) => Ok(bytes[start as usize..end as usize].to_vec()),
            Data::Disk(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(start)).await?;
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf).await?;
                Ok(buf)
            }
        }
    }
}

/// MIME type from the file extension; `application/octet-stream` when unknown.
/// An extension mapped to several types resolves to its `video/*` entry first,
/// then its `audio/*` entry.
pub fn guess_mime_type(name: &str) -> String {
    let guess = mime_guess::from_path(name);
    guess
        .iter()
        .find(|m| m.type_() == mime_guess::mime::VIDEO)
        .or_else(|| guess.iter().find(|m| m.type_() == mime_guess::mime::AUDIO))
        .unwrap_or_else(|| guess.first_or_octet_stream())
        .essence_str()
        .to_string()
}
