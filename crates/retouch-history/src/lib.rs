//! retouch-history: versioned edits with undo/redo.
//!
//! Every edit of a photo becomes an immutable [`ImageVersion`] row in an
//! append-only ledger, numbered 1, 2, 3, ... per image. A per-image
//! [`EditSession`] holds the undo and redo stacks that decide which
//! version is current. [`Editor`] ties both to a [`BlobStore`] holding the
//! pixels and runs the pixel operations from `retouch-pipeline`.
//!
//! Storage is pluggable through [`RowStore`] and [`BlobStore`]. In-memory,
//! SQLite, and filesystem adapters are included.

pub mod codec;
pub mod committer;
pub mod editor;
pub mod error;
pub mod fs;
pub mod handlers;
pub mod id;
pub mod memory;
pub mod operation;
pub mod resolver;
pub mod session;
pub mod sqlite;
pub mod store;
pub mod version;

pub use committer::{LockTable, PendingEdit};
pub use editor::Editor;
pub use error::{HistoryError, Result};
pub use fs::FsBlobStore;
pub use handlers::Placement;
pub use id::{ImageId, UserId, Version};
pub use memory::{MemoryBlobStore, MemoryRowStore};
pub use session::{EditSession, History};
pub use sqlite::SqliteRowStore;
pub use store::{BlobStore, RowStore, RowTx, legacy_key, storage_key};
pub use version::{CropData, ImageVersion, OperationKind};
