//! SQLite row store.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::codec::{decode_stack, encode_stack};
use crate::error::{HistoryError, Result};
use crate::id::{ImageId, UserId, Version};
use crate::session::EditSession;
use crate::store::{RowStore, RowTx};
use crate::version::{CropData, ImageVersion};

/// Database schema.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS image_versions (
    image_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    label TEXT NOT NULL,
    current_image_url TEXT NOT NULL UNIQUE,
    base_image_url TEXT,
    crop_x INTEGER,
    crop_y INTEGER,
    crop_width INTEGER,
    crop_height INTEGER,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (image_id, version)
);

CREATE INDEX IF NOT EXISTS idx_image_versions_user ON image_versions(user_id);

CREATE TABLE IF NOT EXISTS edit_sessions (
    image_id TEXT PRIMARY KEY,
    undo_stack TEXT NOT NULL,
    redo_stack TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const VERSION_COLUMNS: &str = "image_id, version, user_id, label, current_image_url, \
     base_image_url, crop_x, crop_y, crop_width, crop_height";

/// Row store in a SQLite database.
pub struct SqliteRowStore {
    conn: Mutex<Connection>,
}

impl SqliteRowStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// A private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Conversion error for a text column that failed to parse.
fn text_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<ImageVersion> {
    let image_id: String = row.get(0)?;
    let user_id: String = row.get(2)?;
    let label: String = row.get(3)?;
    let crop: (Option<u32>, Option<u32>, Option<u32>, Option<u32>) =
        (row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?);

    let crop_data = match crop {
        (Some(x), Some(y), Some(width), Some(height)) => Some(CropData {
            x,
            y,
            width,
            height,
        }),
        _ => None,
    };

    Ok(ImageVersion {
        image_id: image_id.parse().map_err(|e| text_error(0, e))?,
        version: row.get(1)?,
        user_id: user_id.parse().map_err(|e| text_error(2, e))?,
        label: label.parse().map_err(|e| text_error(3, e))?,
        current_image_url: row.get(4)?,
        base_image_url: row.get(5)?,
        crop_data,
    })
}

fn query_session(conn: &Connection, image_id: ImageId) -> Result<Option<EditSession>> {
    let stacks: Option<(String, String)> = conn
        .query_row(
            "SELECT undo_stack, redo_stack FROM edit_sessions WHERE image_id = ?1",
            [image_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    stacks
        .map(|(undo, redo)| {
            Ok(EditSession::from_parts(
                image_id,
                decode_stack(&undo)?,
                decode_stack(&redo)?,
            ))
        })
        .transpose()
}

/// The lowest or highest version row of an image.
fn query_edge(conn: &Connection, image_id: ImageId, latest: bool) -> Result<Option<ImageVersion>> {
    let order = if latest { "DESC" } else { "ASC" };
    let row = conn
        .query_row(
            &format!(
                "SELECT {VERSION_COLUMNS} FROM image_versions \
                 WHERE image_id = ?1 ORDER BY version {order} LIMIT 1"
            ),
            [image_id.to_string()],
            version_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_versions(conn: &Connection, image_id: ImageId) -> Result<Vec<ImageVersion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VERSION_COLUMNS} FROM image_versions WHERE image_id = ?1 ORDER BY version"
    ))?;
    let rows = stmt
        .query_map([image_id.to_string()], version_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl RowTx for SqliteTx<'_> {
    fn insert_version(&mut self, row: &ImageVersion) -> Result<()> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM image_versions WHERE image_id = ?1 AND version = ?2",
                params![row.image_id.to_string(), row.version],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(HistoryError::DuplicateVersion {
                image_id: row.image_id,
                version: row.version,
            });
        }

        let crop = row.crop_data;
        self.conn.execute(
            &format!(
                "INSERT INTO image_versions ({VERSION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                row.image_id.to_string(),
                row.version,
                row.user_id.to_string(),
                row.label.label(),
                row.current_image_url,
                row.base_image_url,
                crop.map(|c| c.x),
                crop.map(|c| c.y),
                crop.map(|c| c.width),
                crop.map(|c| c.height),
            ],
        )?;
        Ok(())
    }

    fn latest_version(&mut self, image_id: ImageId) -> Result<Option<ImageVersion>> {
        query_edge(self.conn, image_id, true)
    }

    fn first_version(&mut self, image_id: ImageId) -> Result<Option<ImageVersion>> {
        query_edge(self.conn, image_id, false)
    }

    fn load_session(&mut self, image_id: ImageId) -> Result<Option<EditSession>> {
        query_session(self.conn, image_id)
    }

    fn save_session(&mut self, session: &EditSession) -> Result<()> {
        self.conn.execute(
            "INSERT INTO edit_sessions (image_id, undo_stack, redo_stack) VALUES (?1, ?2, ?3) \
             ON CONFLICT(image_id) DO UPDATE SET \
                 undo_stack = excluded.undo_stack, \
                 redo_stack = excluded.redo_stack, \
                 updated_at = CURRENT_TIMESTAMP",
            params![
                session.image_id().to_string(),
                encode_stack(session.undo_stack()),
                encode_stack(session.redo_stack()),
            ],
        )?;
        Ok(())
    }

    fn delete_image(&mut self, image_id: ImageId) -> Result<Vec<ImageVersion>> {
        let removed = query_versions(self.conn, image_id)?;
        let id = image_id.to_string();
        self.conn
            .execute("DELETE FROM image_versions WHERE image_id = ?1", [&id])?;
        self.conn
            .execute("DELETE FROM edit_sessions WHERE image_id = ?1", [&id])?;
        Ok(removed)
    }
}

impl RowStore for SqliteRowStore {
    fn get_version(&self, image_id: ImageId, version: Version) -> Result<Option<ImageVersion>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM image_versions \
                     WHERE image_id = ?1 AND version = ?2"
                ),
                params![image_id.to_string(), version],
                version_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn latest_version(&self, image_id: ImageId) -> Result<Option<ImageVersion>> {
        query_edge(&self.conn.lock(), image_id, true)
    }

    fn versions(&self, image_id: ImageId) -> Result<Vec<ImageVersion>> {
        query_versions(&self.conn.lock(), image_id)
    }

    fn versions_by_user(&self, user_id: UserId) -> Result<Vec<ImageVersion>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM image_versions \
             WHERE user_id = ?1 ORDER BY image_id, version"
        ))?;
        let rows = stmt
            .query_map([user_id.to_string()], version_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn session(&self, image_id: ImageId) -> Result<Option<EditSession>> {
        query_session(&self.conn.lock(), image_id)
    }

    fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn RowTx) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        // Writers across connections are serialised from the first read.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = work(&mut SqliteTx { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }
}
