//! The upward interface: uploads, undo/redo, queries, deletion.
//!
//! [`Editor`] owns the stores and the per-image lock table. Pixel
//! operations live in [`handlers`](crate::handlers), version resolution
//! in [`resolver`](crate::resolver), commits in
//! [`committer`](crate::committer).

use retouch_pipeline::{EditConfig, decode};
use tracing::{info, warn};

use crate::committer::{LockTable, PendingEdit};
use crate::error::{HistoryError, Result};
use crate::id::{ImageId, UserId};
use crate::session::{EditSession, History};
use crate::store::{BlobStore, RowStore};
use crate::version::{ImageVersion, OperationKind};

/// Versioned photo editor over a row store and a blob store.
pub struct Editor<R, B> {
    rows: R,
    blobs: B,
    locks: LockTable,
    config: EditConfig,
}

impl<R: RowStore, B: BlobStore> Editor<R, B> {
    /// Create an editor.
    pub fn new(rows: R, blobs: B, config: EditConfig) -> Self {
        Self {
            rows,
            blobs,
            locks: LockTable::default(),
            config,
        }
    }

    /// Row store.
    pub const fn rows(&self) -> &R {
        &self.rows
    }

    /// Blob store.
    pub const fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Pixel operation tuning.
    pub const fn config(&self) -> &EditConfig {
        &self.config
    }

    pub(crate) const fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Store a new photo as version 1 of a fresh image.
    ///
    /// The bytes are decoded and re-encoded as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Pipeline`] if the bytes are not an image,
    /// or a storage error.
    pub fn upload(&self, user_id: UserId, bytes: &[u8]) -> Result<ImageVersion> {
        let image = decode(bytes)?;
        let image_id = ImageId::random();
        let edit = PendingEdit {
            kind: OperationKind::Original,
            buffer: &image,
            crop_data: None,
        };
        self.commit(image_id, user_id, edit, None)
    }

    /// Run a session transition under the image lock and return the row
    /// that is current afterwards.
    ///
    /// An image with rows but no session starts from the initial session.
    fn transition<F>(&self, image_id: ImageId, step: F) -> Result<ImageVersion>
    where
        F: FnOnce(&mut EditSession) -> Result<()>,
    {
        let lock = self.locks.handle(image_id);
        let _guard = lock.lock();

        let exists = self.rows.latest_version(image_id)?.is_some();
        self.rows.transaction(|tx| {
            let mut session = match tx.load_session(image_id)? {
                Some(session) => session,
                None if exists => {
                    warn!(%image_id, "initializing missing edit session");
                    EditSession::init(image_id)
                }
                None => return Err(HistoryError::ImageNotFound(image_id)),
            };
            step(&mut session)?;
            tx.save_session(&session)
        })?;
        self.get_current_for_editing(image_id)
    }

    /// Step back one version.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToUndo`] if only one version has
    /// been visited, or [`HistoryError::ImageNotFound`].
    pub fn undo(&self, image_id: ImageId) -> Result<ImageVersion> {
        let row = self.transition(image_id, |s| s.undo().map(drop))?;
        info!(%image_id, version = row.version, "undo");
        Ok(row)
    }

    /// Step forward one version.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToRedo`] if nothing was undone since
    /// the last commit or confirm, or [`HistoryError::ImageNotFound`].
    pub fn redo(&self, image_id: ImageId) -> Result<ImageVersion> {
        let row = self.transition(image_id, |s| s.redo().map(drop))?;
        info!(%image_id, version = row.version, "redo");
        Ok(row)
    }

    /// Discard the redo history and return the current row.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ImageNotFound`].
    pub fn confirm(&self, image_id: ImageId) -> Result<ImageVersion> {
        let row = self.transition(image_id, |s| {
            s.confirm();
            Ok(())
        })?;
        info!(%image_id, version = row.version, "confirmed");
        Ok(row)
    }

    /// Both stacks of an image's session.
    ///
    /// An image without a session reports the initial history.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ImageNotFound`].
    pub fn get_history(&self, image_id: ImageId) -> Result<History> {
        match self.load_session(image_id) {
            Ok(session) => Ok(session.history()),
            Err(HistoryError::SessionNotFound(_)) => {
                if self.rows.latest_version(image_id)?.is_none() {
                    return Err(HistoryError::ImageNotFound(image_id));
                }
                Ok(EditSession::init(image_id).history())
            }
            Err(e) => Err(e),
        }
    }

    /// Every version of an image, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ImageNotFound`] if there are none.
    pub fn list_versions(&self, image_id: ImageId) -> Result<Vec<ImageVersion>> {
        let rows = self.rows.versions(image_id)?;
        if rows.is_empty() {
            return Err(HistoryError::ImageNotFound(image_id));
        }
        Ok(rows)
    }

    /// Remove every version, the session, and every stored blob of an
    /// image.
    ///
    /// Returns the number of versions removed.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ImageNotFound`] if the image has no rows.
    pub fn delete_image(&self, image_id: ImageId) -> Result<usize> {
        let removed = {
            let lock = self.locks.handle(image_id);
            let _guard = lock.lock();
            self.rows.transaction(|tx| tx.delete_image(image_id))?
        };
        self.locks.remove(image_id);

        if removed.is_empty() {
            return Err(HistoryError::ImageNotFound(image_id));
        }
        for row in &removed {
            match self.blobs.delete(&row.current_image_url) {
                Ok(true) => {}
                Ok(false) => warn!(%image_id, key = %row.current_image_url, "stored image already gone"),
                Err(e) => warn!(%image_id, key = %row.current_image_url, error = %e, "could not remove stored image"),
            }
        }
        info!(%image_id, versions = removed.len(), "deleted image");
        Ok(removed.len())
    }

    /// Encoded bytes of the current version.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ImageNotFound`] or
    /// [`HistoryError::BlobNotFound`].
    pub fn current_bytes(&self, image_id: ImageId) -> Result<Vec<u8>> {
        let row = self.get_current_for_editing(image_id)?;
        self.blobs.get(&row.current_image_url)
    }

    /// Distinct images owned by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the row store fails.
    pub fn user_images(&self, user_id: UserId) -> Result<Vec<ImageId>> {
        let mut ids: Vec<ImageId> = self
            .rows
            .versions_by_user(user_id)?
            .into_iter()
            .map(|row| row.image_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// The current version of each of a user's images.
    ///
    /// Images that cannot be resolved are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if listing the user's images fails.
    pub fn user_latest(&self, user_id: UserId) -> Result<Vec<ImageVersion>> {
        Ok(self
            .user_images(user_id)?
            .into_iter()
            .filter_map(|image_id| match self.get_current_for_editing(image_id) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(%image_id, error = %e, "skipping unresolvable image");
                    None
                }
            })
            .collect())
    }
}
