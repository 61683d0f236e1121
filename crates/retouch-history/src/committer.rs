//! Committing new versions.
//!
//! Everything happens inside one exclusive row store transaction: the
//! version number is allocated, the owner and lineage are checked
//! against the first row, the blob is written, and the version row and
//! session update are recorded. If recording fails the blob is deleted
//! while the transaction still holds the write lock, so the key cannot
//! belong to anyone else yet.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use retouch_pipeline::{RgbaImage, encode_png};
use tracing::{info, warn};

use crate::editor::Editor;
use crate::error::{HistoryError, Result};
use crate::id::{ImageId, UserId, Version};
use crate::operation::{OperationParams, RowContext, build_row};
use crate::session::EditSession;
use crate::store::{BlobStore, RowStore, RowTx};
use crate::version::{CropData, ImageVersion, OperationKind};

/// One mutex per image, created on first use.
///
/// Mutations of the same image run one at a time; different images do
/// not contend.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<ImageId, Arc<Mutex<()>>>>,
}

impl LockTable {
    /// The lock of `image_id`. Hold its guard for the whole mutation.
    #[must_use]
    pub fn handle(&self, image_id: ImageId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(image_id).or_default())
    }

    /// Forget the lock of a deleted image, unless a handle to it is
    /// still held elsewhere. Drop your own handle first.
    pub fn remove(&self, image_id: ImageId) {
        let mut locks = self.locks.lock();
        if locks
            .get(&image_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&image_id);
        }
    }

    /// Number of images with a lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no image has a lock entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// A finished buffer waiting to become a version.
#[derive(Debug, Clone, Copy)]
pub struct PendingEdit<'a> {
    /// Operation that produced the buffer.
    pub kind: OperationKind,
    /// The new pixels.
    pub buffer: &'a RgbaImage,
    /// Kept region, for crops.
    pub crop_data: Option<CropData>,
}

impl<R: RowStore, B: BlobStore> Editor<R, B> {
    /// Store `edit.buffer` as the next version of `image_id` and make it
    /// current.
    ///
    /// Versions after the first inherit the image's owner and root: a
    /// `base_image_url` of `None` is filled in from the first row.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::DuplicateVersion`] for an Original on an
    /// existing image, [`HistoryError::OwnerMismatch`] or
    /// [`HistoryError::LineageMismatch`] if `user_id` or
    /// `base_image_url` disagree with the first row, or a storage error.
    /// On error no row, session change, or blob is left behind.
    pub fn commit(
        &self,
        image_id: ImageId,
        user_id: UserId,
        edit: PendingEdit<'_>,
        base_image_url: Option<String>,
    ) -> Result<ImageVersion> {
        let lock = self.locks().handle(image_id);
        let _guard = lock.lock();
        self.commit_locked(image_id, user_id, edit, base_image_url)
    }

    /// [`commit`](Self::commit) for callers already holding the image
    /// lock.
    pub(crate) fn commit_locked(
        &self,
        image_id: ImageId,
        user_id: UserId,
        edit: PendingEdit<'_>,
        base_image_url: Option<String>,
    ) -> Result<ImageVersion> {
        let bytes = encode_png(edit.buffer)?;
        let params = OperationParams {
            crop_data: edit.crop_data,
        };

        let committed = self.rows().transaction(|tx| {
            let version = next_version(tx.latest_version(image_id)?.as_ref());
            if edit.kind == OperationKind::Original && version != 1 {
                return Err(HistoryError::DuplicateVersion {
                    image_id,
                    version: 1,
                });
            }
            let base_image_url = if version == 1 {
                base_image_url
            } else {
                let root = tx
                    .first_version(image_id)?
                    .ok_or(HistoryError::ImageNotFound(image_id))?;
                Some(inherit_lineage(&root, user_id, base_image_url)?)
            };

            let key = self.blobs().put(&self.blobs().key_for(image_id, version), &bytes)?;
            let ctx = RowContext {
                image_id,
                user_id,
                version,
                current_image_url: key.clone(),
                base_image_url,
            };
            build_row(edit.kind, ctx, &params)
                .and_then(|row| record(tx, row))
                .inspect_err(|_| {
                    if let Err(cleanup) = self.blobs().delete(&key) {
                        warn!(%image_id, key = %key, error = %cleanup, "could not remove orphaned image");
                    }
                })
        });

        match committed {
            Ok(row) => {
                info!(%image_id, version = row.version, label = %row.label, "committed version");
                Ok(row)
            }
            Err(e) => {
                warn!(%image_id, label = %edit.kind, error = %e, "commit failed");
                Err(e)
            }
        }
    }
}

/// One past `latest`, or 1 when the image has no rows.
pub(crate) fn next_version(latest: Option<&ImageVersion>) -> Version {
    latest.map_or(1, |row| row.version.saturating_add(1))
}

/// Base key for a new version of the image whose first row is `root`.
///
/// The owner must match the root's. A given base must be the root's key.
fn inherit_lineage(root: &ImageVersion, user_id: UserId, base: Option<String>) -> Result<String> {
    if user_id != root.user_id {
        return Err(HistoryError::OwnerMismatch {
            image_id: root.image_id,
            owner: root.user_id,
            user_id,
        });
    }
    let root_key = root
        .base_image_url
        .as_deref()
        .unwrap_or(&root.current_image_url);
    match base {
        None => Ok(root_key.to_owned()),
        Some(base) if base == root_key || base == root.current_image_url => Ok(base),
        Some(base) => Err(HistoryError::LineageMismatch {
            image_id: root.image_id,
            root: root_key.to_owned(),
            base,
        }),
    }
}

/// Insert `row` and make it the session's current version.
fn record(tx: &mut dyn RowTx, row: ImageVersion) -> Result<ImageVersion> {
    tx.insert_version(&row)?;
    let mut session = tx
        .load_session(row.image_id)?
        .unwrap_or_else(|| EditSession::init(row.image_id));
    if session.current() != Some(row.version) {
        session.commit(row.version);
    }
    tx.save_session(&session)?;
    Ok(row)
}
