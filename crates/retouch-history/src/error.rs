//! Error type for the history layer.

use retouch_pipeline::PipelineError;

use crate::id::{ImageId, UserId, Version};

/// Errors raised by the ledger, sessions, stores, and edit operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// No version rows exist for the image.
    #[error("image {0} not found")]
    ImageNotFound(ImageId),

    /// No edit session row exists for the image.
    #[error("no edit session for image {0}")]
    SessionNotFound(ImageId),

    /// Undo requested with only the current version on the undo stack.
    #[error("nothing to undo")]
    NothingToUndo,

    /// Redo requested with an empty redo stack.
    #[error("nothing to redo")]
    NothingToRedo,

    /// A row with the same `(image_id, version)` is already stored.
    #[error("version {version} of image {image_id} already exists")]
    DuplicateVersion {
        /// Image the row belongs to.
        image_id: ImageId,
        /// Version that was already taken.
        version: Version,
    },

    /// A new version names a different owner than the image's first row.
    #[error("image {image_id} belongs to {owner}, not {user_id}")]
    OwnerMismatch {
        /// Image being edited.
        image_id: ImageId,
        /// Owner recorded on the first version.
        owner: UserId,
        /// Owner the new version named.
        user_id: UserId,
    },

    /// A new version names a base image other than the image's root.
    #[error("image {image_id} descends from {root:?}, not {base:?}")]
    LineageMismatch {
        /// Image being edited.
        image_id: ImageId,
        /// Root key recorded on the first version.
        root: String,
        /// Base key the new version named.
        base: String,
    },

    /// The blob store has nothing under the key.
    #[error("no stored image under key {0:?}")]
    BlobNotFound(String),

    /// A persisted value could not be decoded.
    #[error("malformed stored value {value:?}: {reason}")]
    Codec {
        /// The raw stored text.
        value: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The row store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pixel operation failed (bad geometry, undecodable image, ...).
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// An operation label or tag has no registered row builder.
    #[error("unknown operation {0:?}")]
    UnknownOperation(String),
}

impl From<rusqlite::Error> for HistoryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result alias for the history layer.
pub type Result<T, E = HistoryError> = std::result::Result<T, E>;
