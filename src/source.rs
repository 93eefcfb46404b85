//! File access for chunked transmission.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::Result;

/// A readable upload payload.
///
/// The engine owns the upload offset; a source only answers ranged reads
/// and never keeps a cursor of its own.
#[async_trait]
pub trait UploadSource: Send {
    /// Total payload length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path identifying the payload, used for fingerprinting and the
    /// default `filename` metadata entry.
    fn path(&self) -> &Path;

    /// Read the window `[offset, offset + max_bytes)`, clipped to the end
    /// of the payload. Returns an empty buffer iff `offset` equals the
    /// payload length.
    async fn read_chunk(&mut self, offset: u64, max_bytes: usize) -> Result<Vec<u8>>;
}

/// [`UploadSource`] backed by a file on disk.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileSource {
    /// Open `path` and snapshot its current length.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        Ok(Self { path, file, len })
    }
}

#[async_trait]
impl UploadSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn read_chunk(&mut self, offset: u64, max_bytes: usize) -> Result<Vec<u8>> {
        let end = self.len.min(offset.saturating_add(max_bytes as u64));
        let span = end.saturating_sub(offset) as usize;
        let mut buf = vec![0u8; span];
        if span == 0 {
            return Ok(buf);
        }

        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn source_with(content: &[u8]) -> (NamedTempFile, FileSource) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        let source = FileSource::open(file.path()).await.unwrap();
        (file, source)
    }

    #[tokio::test]
    async fn reads_successive_windows() {
        let (_guard, mut source) = source_with(b"HELLOWORLD").await;
        assert_eq!(source.len(), 10);

        assert_eq!(source.read_chunk(0, 4).await.unwrap(), b"HELL");
        assert_eq!(source.read_chunk(4, 4).await.unwrap(), b"OWOR");
        assert_eq!(source.read_chunk(8, 4).await.unwrap(), b"LD");
    }

    #[tokio::test]
    async fn reads_do_not_advance_a_cursor() {
        let (_guard, mut source) = source_with(b"HELLOWORLD").await;

        assert_eq!(source.read_chunk(2, 3).await.unwrap(), b"LLO");
        assert_eq!(source.read_chunk(2, 3).await.unwrap(), b"LLO");
    }

    #[tokio::test]
    async fn read_at_end_is_empty() {
        let (_guard, mut source) = source_with(b"HELLOWORLD").await;
        assert!(source.read_chunk(10, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_missing_file_is_an_io_error() {
        let err = FileSource::open("/no/such/file.bin").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Io(_)));
    }
}
