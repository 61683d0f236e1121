//! Filesystem blob store: one file per key under a root directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::store::{BlobStore, legacy_key, parse_storage_key};

/// Stores each blob as `<root>/<key>`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Store blobs under `root`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the blobs.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `key`, refusing keys that would escape the root.
    fn path_of(&self, key: &str) -> Result<PathBuf> {
        let plain = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.contains('\0');
        if !plain {
            return Err(HistoryError::Storage(format!("invalid blob key {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        std::fs::write(self.path_of(key)?, bytes)?;
        Ok(key.to_owned())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        match std::fs::read(self.path_of(key)?) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // Older stores wrote keys without the extension.
        if let Some((image_id, version)) = parse_storage_key(key) {
            let legacy = legacy_key(image_id, version);
            match std::fs::read(self.path_of(&legacy)?) {
                Ok(bytes) => {
                    debug!(key, legacy = %legacy, "read blob under legacy key");
                    return Ok(bytes);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(HistoryError::BlobNotFound(key.to_owned()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.path_of(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
