//! In-memory stores, for tests and throwaway sessions.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::{HistoryError, Result};
use crate::id::{ImageId, UserId, Version};
use crate::session::EditSession;
use crate::store::{BlobStore, RowStore, RowTx};
use crate::version::ImageVersion;

#[derive(Debug, Default)]
struct Tables {
    versions: BTreeMap<(ImageId, Version), ImageVersion>,
    urls: HashSet<String>,
    sessions: HashMap<ImageId, EditSession>,
}

impl Tables {
    fn rows_of(
        &self,
        image_id: ImageId,
    ) -> impl DoubleEndedIterator<Item = &ImageVersion> + '_ {
        self.versions
            .range((image_id, Version::MIN)..=(image_id, Version::MAX))
            .map(|(_, row)| row)
    }

    fn insert(&mut self, row: ImageVersion) {
        self.urls.insert(row.current_image_url.clone());
        self.versions.insert((row.image_id, row.version), row);
    }

    fn remove(&mut self, key: (ImageId, Version)) -> Option<ImageVersion> {
        let row = self.versions.remove(&key)?;
        self.urls.remove(&row.current_image_url);
        Some(row)
    }
}

/// Row store backed by maps behind a mutex.
///
/// A transaction holds the mutex for its whole run and journals each
/// change; on error the journal is replayed backwards.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: Mutex<Tables>,
}

impl MemoryRowStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A change made inside a transaction, holding what it replaced.
enum Undo {
    Inserted((ImageId, Version)),
    Session(ImageId, Option<EditSession>),
    Removed(Vec<ImageVersion>),
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
    journal: Vec<Undo>,
}

impl MemoryTx<'_> {
    fn roll_back(self) {
        let Self { tables, journal } = self;
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Inserted(key) => {
                    tables.remove(key);
                }
                Undo::Session(image_id, Some(previous)) => {
                    tables.sessions.insert(image_id, previous);
                }
                Undo::Session(image_id, None) => {
                    tables.sessions.remove(&image_id);
                }
                Undo::Removed(rows) => {
                    for row in rows {
                        tables.insert(row);
                    }
                }
            }
        }
    }
}

impl RowTx for MemoryTx<'_> {
    fn insert_version(&mut self, row: &ImageVersion) -> Result<()> {
        let key = (row.image_id, row.version);
        if self.tables.versions.contains_key(&key) {
            return Err(HistoryError::DuplicateVersion {
                image_id: row.image_id,
                version: row.version,
            });
        }
        if self.tables.urls.contains(&row.current_image_url) {
            return Err(HistoryError::Storage(format!(
                "image key {:?} is already used",
                row.current_image_url
            )));
        }
        self.tables.insert(row.clone());
        self.journal.push(Undo::Inserted(key));
        Ok(())
    }

    fn latest_version(&mut self, image_id: ImageId) -> Result<Option<ImageVersion>> {
        Ok(self.tables.rows_of(image_id).next_back().cloned())
    }

    fn first_version(&mut self, image_id: ImageId) -> Result<Option<ImageVersion>> {
        Ok(self.tables.rows_of(image_id).next().cloned())
    }

    fn load_session(&mut self, image_id: ImageId) -> Result<Option<EditSession>> {
        Ok(self.tables.sessions.get(&image_id).cloned())
    }

    fn save_session(&mut self, session: &EditSession) -> Result<()> {
        let previous = self
            .tables
            .sessions
            .insert(session.image_id(), session.clone());
        self.journal.push(Undo::Session(session.image_id(), previous));
        Ok(())
    }

    fn delete_image(&mut self, image_id: ImageId) -> Result<Vec<ImageVersion>> {
        let keys: Vec<_> = self
            .tables
            .rows_of(image_id)
            .map(|row| (row.image_id, row.version))
            .collect();
        let removed: Vec<ImageVersion> = keys
            .into_iter()
            .filter_map(|key| self.tables.remove(key))
            .collect();
        self.journal.push(Undo::Removed(removed.clone()));
        let session = self.tables.sessions.remove(&image_id);
        self.journal.push(Undo::Session(image_id, session));
        Ok(removed)
    }
}

impl RowStore for MemoryRowStore {
    fn get_version(&self, image_id: ImageId, version: Version) -> Result<Option<ImageVersion>> {
        Ok(self.tables.lock().versions.get(&(image_id, version)).cloned())
    }

    fn latest_version(&self, image_id: ImageId) -> Result<Option<ImageVersion>> {
        Ok(self.tables.lock().rows_of(image_id).next_back().cloned())
    }

    fn versions(&self, image_id: ImageId) -> Result<Vec<ImageVersion>> {
        Ok(self.tables.lock().rows_of(image_id).cloned().collect())
    }

    fn versions_by_user(&self, user_id: UserId) -> Result<Vec<ImageVersion>> {
        Ok(self
            .tables
            .lock()
            .versions
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    fn session(&self, image_id: ImageId) -> Result<Option<EditSession>> {
        Ok(self.tables.lock().sessions.get(&image_id).cloned())
    }

    fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn RowTx) -> Result<T>,
    {
        let mut tables = self.tables.lock();
        let mut tx = MemoryTx {
            tables: &mut tables,
            journal: Vec::new(),
        };
        match work(&mut tx) {
            Ok(out) => Ok(out),
            Err(e) => {
                tx.roll_back();
                Err(e)
            }
        }
    }
}

/// Blob store backed by a map behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        self.blobs.lock().insert(key.to_owned(), bytes.to_vec());
        Ok(key.to_owned())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| HistoryError::BlobNotFound(key.to_owned()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.lock().remove(key).is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::version::OperationKind;

    fn row(image_id: ImageId, version: Version) -> ImageVersion {
        ImageVersion {
            image_id,
            version,
            user_id: UserId::from_uuid(uuid::Uuid::nil()),
            label: OperationKind::Resized,
            current_image_url: format!("{image_id}_{version}.png"),
            base_image_url: None,
            crop_data: None,
        }
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = MemoryRowStore::new();
        let id = ImageId::random();
        let result: Result<()> = store.transaction(|tx| {
            tx.insert_version(&row(id, 1))?;
            tx.save_session(&EditSession::init(id))?;
            Err(HistoryError::Storage("boom".to_owned()))
        });
        assert!(result.is_err());
        assert!(store.latest_version(id).unwrap().is_none());
        assert!(store.session(id).unwrap().is_none());
    }

    #[test]
    fn failed_transaction_restores_earlier_state() {
        let store = MemoryRowStore::new();
        let id = ImageId::random();
        let mut session = EditSession::init(id);
        session.commit(2);
        store
            .transaction(|tx| {
                tx.insert_version(&row(id, 1))?;
                tx.insert_version(&row(id, 2))?;
                tx.save_session(&session)
            })
            .unwrap();

        let result: Result<()> = store.transaction(|tx| {
            tx.delete_image(id)?;
            tx.insert_version(&row(id, 1))?;
            tx.save_session(&EditSession::init(id))?;
            Err(HistoryError::Storage("boom".to_owned()))
        });
        assert!(result.is_err());
        assert_eq!(store.versions(id).unwrap(), vec![row(id, 1), row(id, 2)]);
        assert_eq!(store.session(id).unwrap(), Some(session));

        // The key index was restored with the rows.
        let again = store.transaction(|tx| tx.insert_version(&row(id, 2)));
        assert!(matches!(again, Err(HistoryError::DuplicateVersion { version: 2, .. })));
    }

    #[test]
    fn reused_image_key_is_rejected() {
        let store = MemoryRowStore::new();
        let id = ImageId::random();
        store.transaction(|tx| tx.insert_version(&row(id, 1))).unwrap();
        let mut clash = row(id, 2);
        clash.current_image_url = row(id, 1).current_image_url;
        let result = store.transaction(|tx| tx.insert_version(&clash));
        assert!(matches!(result, Err(HistoryError::Storage(_))));
        assert_eq!(store.versions(id).unwrap().len(), 1);
    }

    #[test]
    fn first_and_latest_inside_a_transaction() {
        let store = MemoryRowStore::new();
        let id = ImageId::random();
        let (first, latest) = store
            .transaction(|tx| {
                for v in 1..=3 {
                    tx.insert_version(&row(id, v))?;
                }
                Ok((tx.first_version(id)?, tx.latest_version(id)?))
            })
            .unwrap();
        assert_eq!(first.map(|r| r.version), Some(1));
        assert_eq!(latest.map(|r| r.version), Some(3));
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let store = MemoryRowStore::new();
        let id = ImageId::random();
        store.transaction(|tx| tx.insert_version(&row(id, 1))).unwrap();
        let result = store.transaction(|tx| tx.insert_version(&row(id, 1)));
        assert!(matches!(
            result,
            Err(HistoryError::DuplicateVersion { version: 1, .. })
        ));
    }

    #[test]
    fn latest_and_versions_are_scoped_to_the_image() {
        let store = MemoryRowStore::new();
        let a = ImageId::random();
        let b = ImageId::random();
        store
            .transaction(|tx| {
                for v in 1..=3 {
                    tx.insert_version(&row(a, v))?;
                }
                tx.insert_version(&row(b, 1))
            })
            .unwrap();
        assert_eq!(store.latest_version(a).unwrap().unwrap().version, 3);
        assert_eq!(store.versions(a).unwrap().len(), 3);
        assert_eq!(store.versions(b).unwrap().len(), 1);

        let removed = store.transaction(|tx| tx.delete_image(a)).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(store.versions(a).unwrap().is_empty());
        assert_eq!(store.versions(b).unwrap().len(), 1);
    }

    #[test]
    fn blob_round_trip_and_delete() {
        let blobs = MemoryBlobStore::new();
        let key = blobs.put("k.png", b"abc").unwrap();
        assert_eq!(blobs.get(&key).unwrap(), b"abc");
        assert!(blobs.delete(&key).unwrap());
        assert!(!blobs.delete(&key).unwrap());
        assert!(matches!(blobs.get(&key), Err(HistoryError::BlobNotFound(_))));
    }
}
