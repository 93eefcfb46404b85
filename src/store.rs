//! Persistence of fingerprint → upload-URI mappings.
//!
//! A store is what makes an upload survive a process restart: the engine
//! records the server-assigned resource URI under the file's fingerprint and
//! looks it up again on the next run instead of creating a fresh upload.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use log::debug;

use crate::error::{Error, Result};

/// Maps a file fingerprint to the upload URI the server assigned for it.
///
/// Entries live from upload creation until completion or cancellation. A
/// missing entry is an absence, not an error. Implementations must be safe
/// to share across concurrently running upload sessions.
pub trait UploadStore: Send + Sync {
    /// Insert or overwrite the entry for `fingerprint`.
    fn put(&self, fingerprint: &str, upload_uri: &str) -> Result<()>;

    /// Look up the stored URI, if any.
    fn get(&self, fingerprint: &str) -> Result<Option<String>>;

    /// Remove the entry if present. Removing an absent entry is a no-op.
    fn delete(&self, fingerprint: &str) -> Result<()>;
}

/// In-process store; contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Store("upload store mutex poisoned".to_string()))
    }
}

impl UploadStore for MemoryStore {
    fn put(&self, fingerprint: &str, upload_uri: &str) -> Result<()> {
        self.lock()?
            .insert(fingerprint.to_string(), upload_uri.to_string());
        Ok(())
    }

    fn get(&self, fingerprint: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(fingerprint).cloned())
    }

    fn delete(&self, fingerprint: &str) -> Result<()> {
        self.lock()?.remove(fingerprint);
        Ok(())
    }
}

/// Durable store keeping one regular file per fingerprint.
///
/// The entry for fingerprint `f` lives at `<dir>/<f>` and holds the upload
/// URI as UTF-8 text. File absence is entry absence, so entries written by a
/// previous process are picked up automatically.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Store(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(fingerprint)
    }
}

impl UploadStore for FileStore {
    fn put(&self, fingerprint: &str, upload_uri: &str) -> Result<()> {
        let path = self.entry_path(fingerprint);
        debug!("storing upload uri for {fingerprint} at {}", path.display());
        std::fs::write(&path, upload_uri)
            .map_err(|e| Error::Store(format!("{}: {e}", path.display())))
    }

    fn get(&self, fingerprint: &str) -> Result<Option<String>> {
        let path = self.entry_path(fingerprint);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents.trim_end().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Store(format!("{}: {e}", path.display()))),
        }
    }

    fn delete(&self, fingerprint: &str) -> Result<()> {
        // Only the entry file goes; sibling entries and the directory stay.
        let path = self.entry_path(fingerprint);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Store(format!("{}: {e}", path.display()))),
        }
    }
}
