//! Storage collaborator interfaces.
//!
//! [`RowStore`] holds version rows and sessions; [`BlobStore`] holds the
//! encoded pixels of each version. Writes to the row store only happen
//! inside [`RowStore::transaction`], so a version row and the session
//! update that references it land together or not at all.

use crate::error::Result;
use crate::id::{ImageId, UserId, Version};
use crate::session::EditSession;
use crate::version::ImageVersion;

/// Blob key of a version: `"{image_id}_{version}.png"`.
#[must_use]
pub fn storage_key(image_id: ImageId, version: Version) -> String {
    format!("{image_id}_{version}.png")
}

/// Extension-less key some older stores wrote: `"{image_id}_{version}"`.
///
/// Only used by stores for lenient lookup of existing blobs.
#[must_use]
pub fn legacy_key(image_id: ImageId, version: Version) -> String {
    format!("{image_id}_{version}")
}

/// Split a key produced by [`storage_key`] back into its parts.
#[must_use]
pub fn parse_storage_key(key: &str) -> Option<(ImageId, Version)> {
    let stem = key.strip_suffix(".png")?;
    let (id, version) = stem.rsplit_once('_')?;
    Some((id.parse().ok()?, version.parse().ok()?))
}

/// Writes available inside a row store transaction.
pub trait RowTx {
    /// Append a version row.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::DuplicateVersion`](crate::HistoryError::DuplicateVersion)
    /// if `(image_id, version)` is already stored.
    fn insert_version(&mut self, row: &ImageVersion) -> Result<()>;

    /// The row with the highest version number, as of this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn latest_version(&mut self, image_id: ImageId) -> Result<Option<ImageVersion>>;

    /// The row with the lowest version number: the root of the lineage.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn first_version(&mut self, image_id: ImageId) -> Result<Option<ImageVersion>>;

    /// Read the session as of this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored stacks are
    /// malformed.
    fn load_session(&mut self, image_id: ImageId) -> Result<Option<EditSession>>;

    /// Create or replace the session row.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn save_session(&mut self, session: &EditSession) -> Result<()>;

    /// Remove every version row and the session of an image, returning
    /// the removed rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn delete_image(&mut self, image_id: ImageId) -> Result<Vec<ImageVersion>>;
}

/// Version ledger and session storage.
pub trait RowStore: Send + Sync {
    /// One version row.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn get_version(&self, image_id: ImageId, version: Version) -> Result<Option<ImageVersion>>;

    /// The row with the highest version number.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn latest_version(&self, image_id: ImageId) -> Result<Option<ImageVersion>>;

    /// Every row of an image, ascending by version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn versions(&self, image_id: ImageId) -> Result<Vec<ImageVersion>>;

    /// Every row owned by a user, ordered by image then version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn versions_by_user(&self, user_id: UserId) -> Result<Vec<ImageVersion>>;

    /// The session of an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stored stacks are
    /// malformed.
    fn session(&self, image_id: ImageId) -> Result<Option<EditSession>>;

    /// Run `work` atomically: every write it makes is kept if it returns
    /// `Ok`, and none is if it returns `Err`.
    ///
    /// Transactions are exclusive: while `work` runs no other
    /// transaction on the same data can write, even one started from
    /// another process sharing the database.
    ///
    /// # Errors
    ///
    /// Returns the error from `work`, or a store error if the
    /// transaction cannot be started or committed.
    fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn RowTx) -> Result<T>;
}

/// Pixel storage addressed by opaque string keys.
pub trait BlobStore: Send + Sync {
    /// Key a new version should be stored under.
    fn key_for(&self, image_id: ImageId, version: Version) -> String {
        storage_key(image_id, version)
    }

    /// Store `bytes` under `key` and return the key actually used.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    /// Fetch the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::BlobNotFound`](crate::HistoryError::BlobNotFound)
    /// if nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove `key`, returning whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn delete(&self, key: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_format() {
        let id = ImageId::from_uuid(uuid::Uuid::nil());
        assert_eq!(
            storage_key(id, 3),
            "00000000-0000-0000-0000-000000000000_3.png"
        );
        assert_eq!(
            legacy_key(id, 3),
            "00000000-0000-0000-0000-000000000000_3"
        );
    }

    #[test]
    fn storage_key_parses_back() {
        let id = ImageId::random();
        assert_eq!(parse_storage_key(&storage_key(id, 12)), Some((id, 12)));
        assert_eq!(parse_storage_key(&legacy_key(id, 12)), None);
        assert_eq!(parse_storage_key("clothes.png"), None);
    }
}
