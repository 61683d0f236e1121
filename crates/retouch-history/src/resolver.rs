//! Which version is current, what comes next, and where a lineage
//! starts.

use tracing::{debug, warn};

use crate::committer::next_version;
use crate::editor::Editor;
use crate::error::{HistoryError, Result};
use crate::id::{ImageId, Version};
use crate::session::EditSession;
use crate::store::{BlobStore, RowStore};
use crate::version::ImageVersion;

impl<R: RowStore, B: BlobStore> Editor<R, B> {
    /// The session of an image.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::SessionNotFound`] if the image has no
    /// session row.
    pub fn load_session(&self, image_id: ImageId) -> Result<EditSession> {
        self.rows()
            .session(image_id)?
            .ok_or(HistoryError::SessionNotFound(image_id))
    }

    /// The version row the user is currently looking at.
    ///
    /// Follows the top of the undo stack. If the session is missing, or
    /// points at a version the ledger does not have, falls back to the
    /// latest version.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ImageNotFound`] if the image has no rows.
    pub fn get_current_for_editing(&self, image_id: ImageId) -> Result<ImageVersion> {
        let target = match self.load_session(image_id) {
            Ok(session) => session.current(),
            Err(HistoryError::SessionNotFound(_)) => {
                warn!(%image_id, "no edit session, using latest version");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(version) = target {
            if let Some(row) = self.rows().get_version(image_id, version)? {
                debug!(%image_id, version, "resolved current version");
                return Ok(row);
            }
            warn!(%image_id, version, "session points at a missing version");
            if let Some(row) = self
                .rows()
                .versions(image_id)?
                .into_iter()
                .find(|row| row.version == version)
            {
                return Ok(row);
            }
        }

        self.rows()
            .latest_version(image_id)?
            .ok_or(HistoryError::ImageNotFound(image_id))
    }

    /// The version number the next commit will get: one past the latest,
    /// or 1 for an unknown image.
    ///
    /// # Errors
    ///
    /// Returns an error if the row store fails.
    pub fn get_next_version(&self, image_id: ImageId) -> Result<Version> {
        Ok(next_version(self.rows().latest_version(image_id)?.as_ref()))
    }

    /// Blob key of the lineage root of `current`.
    ///
    /// Uses the row's own base key when set, otherwise the key of the
    /// lowest stored version, otherwise the row's own key.
    ///
    /// # Errors
    ///
    /// Returns an error if the row store fails.
    pub fn resolve_base_image_url(&self, image_id: ImageId, current: &ImageVersion) -> Result<String> {
        if let Some(base) = &current.base_image_url {
            return Ok(base.clone());
        }
        let root = self
            .rows()
            .versions(image_id)?
            .into_iter()
            .min_by_key(|row| row.version);
        Ok(root.map_or_else(
            || current.current_image_url.clone(),
            |row| row.current_image_url,
        ))
    }
}
