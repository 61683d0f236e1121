//! Per-image undo/redo state machine.
//!
//! The state is the `(undo_stack, redo_stack)` pair. The top of the undo
//! stack is the version the user currently sees. History is linear:
//! committing after an undo discards the abandoned redo branch.

use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};
use crate::id::{ImageId, Version};

/// Undo/redo stacks of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    image_id: ImageId,
    undo_stack: Vec<Version>,
    redo_stack: Vec<Version>,
}

impl EditSession {
    /// Fresh session showing the uploaded version.
    #[must_use]
    pub fn init(image_id: ImageId) -> Self {
        Self {
            image_id,
            undo_stack: vec![1],
            redo_stack: Vec::new(),
        }
    }

    /// Rebuild a session from persisted stacks.
    #[must_use]
    pub const fn from_parts(
        image_id: ImageId,
        undo_stack: Vec<Version>,
        redo_stack: Vec<Version>,
    ) -> Self {
        Self {
            image_id,
            undo_stack,
            redo_stack,
        }
    }

    /// Image this session tracks.
    #[must_use]
    pub const fn image_id(&self) -> ImageId {
        self.image_id
    }

    /// Visited versions, oldest first. The last entry is current.
    #[must_use]
    pub fn undo_stack(&self) -> &[Version] {
        &self.undo_stack
    }

    /// Versions available to redo. The last entry is redone first.
    #[must_use]
    pub fn redo_stack(&self) -> &[Version] {
        &self.redo_stack
    }

    /// The version the user currently sees, if the undo stack is not
    /// empty.
    #[must_use]
    pub fn current(&self) -> Option<Version> {
        self.undo_stack.last().copied()
    }

    /// Record a newly committed version and drop the redo branch.
    pub fn commit(&mut self, version: Version) {
        self.undo_stack.push(version);
        self.redo_stack.clear();
    }

    /// Step back one version and return the new current version.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToUndo`] when only one version is
    /// on the undo stack.
    pub fn undo(&mut self) -> Result<Version> {
        if self.undo_stack.len() <= 1 {
            return Err(HistoryError::NothingToUndo);
        }
        let Some(undone) = self.undo_stack.pop() else {
            return Err(HistoryError::NothingToUndo);
        };
        self.redo_stack.push(undone);
        self.current().ok_or(HistoryError::NothingToUndo)
    }

    /// Step forward one version and return it.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToRedo`] when the redo stack is
    /// empty.
    pub fn redo(&mut self) -> Result<Version> {
        let version = self.redo_stack.pop().ok_or(HistoryError::NothingToRedo)?;
        self.undo_stack.push(version);
        Ok(version)
    }

    /// Lock in the current branch by discarding redo history.
    pub fn confirm(&mut self) {
        self.redo_stack.clear();
    }

    /// Read-only copy of both stacks.
    #[must_use]
    pub fn history(&self) -> History {
        History {
            undo_stack: self.undo_stack.clone(),
            redo_stack: self.redo_stack.clone(),
        }
    }
}

/// Both stacks of a session, as exposed to callers.
///
/// Serializes version numbers as strings:
/// `{"undoStack": ["1", "2"], "redoStack": []}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    /// Visited versions, oldest first.
    #[serde(with = "version_strings")]
    pub undo_stack: Vec<Version>,
    /// Redoable versions, next redo last.
    #[serde(with = "version_strings")]
    pub redo_stack: Vec<Version>,
}

mod version_strings {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::id::Version;

    pub fn serialize<S: Serializer>(stack: &[Version], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(stack.iter().map(ToString::to_string))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Version>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| s.parse().map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session() -> EditSession {
        EditSession::init(ImageId::random())
    }

    #[test]
    fn init_shows_the_upload() {
        let s = session();
        assert_eq!(s.undo_stack(), &[1]);
        assert!(s.redo_stack().is_empty());
        assert_eq!(s.current(), Some(1));
    }

    #[test]
    fn undo_on_fresh_session_fails() {
        let mut s = session();
        assert!(matches!(s.undo(), Err(HistoryError::NothingToUndo)));
        assert_eq!(s.undo_stack(), &[1]);
    }

    #[test]
    fn redo_with_empty_stack_fails() {
        let mut s = session();
        assert!(matches!(s.redo(), Err(HistoryError::NothingToRedo)));
    }

    #[test]
    fn undo_then_redo_restores_current() {
        let mut s = session();
        s.commit(2);
        s.commit(3);
        assert_eq!(s.undo().unwrap(), 2);
        assert_eq!(s.redo_stack(), &[3]);
        assert_eq!(s.redo().unwrap(), 3);
        assert_eq!(s.current(), Some(3));
        assert!(s.redo_stack().is_empty());
    }

    #[test]
    fn commit_clears_redo() {
        let mut s = session();
        s.commit(2);
        s.commit(3);
        s.undo().unwrap();
        s.undo().unwrap();
        assert_eq!(s.redo_stack(), &[3, 2]);
        s.commit(4);
        assert_eq!(s.undo_stack(), &[1, 4]);
        assert!(s.redo_stack().is_empty());
    }

    #[test]
    fn confirm_keeps_undo_stack() {
        let mut s = session();
        s.commit(2);
        s.undo().unwrap();
        s.confirm();
        assert_eq!(s.undo_stack(), &[1]);
        assert!(s.redo_stack().is_empty());
    }

    #[test]
    fn history_serializes_versions_as_strings() {
        let mut s = session();
        s.commit(2);
        s.undo().unwrap();
        let json = serde_json::to_string(&s.history()).unwrap();
        assert_eq!(json, r#"{"undoStack":["1"],"redoStack":["2"]}"#);

        let back: History = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s.history());
    }
}
