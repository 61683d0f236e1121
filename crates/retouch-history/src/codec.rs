//! Text encoding of undo/redo stacks for row stores that keep them as
//! strings.
//!
//! Format: `v1:` followed by comma-separated version numbers, e.g.
//! `v1:1,2,5`. The unversioned `1,2,5` form written by older stores is
//! still accepted on read.

use crate::error::{HistoryError, Result};
use crate::id::Version;

const PREFIX_V1: &str = "v1:";

/// Encode a stack, bottom first.
#[must_use]
pub fn encode_stack(stack: &[Version]) -> String {
    let body: Vec<String> = stack.iter().map(ToString::to_string).collect();
    format!("{PREFIX_V1}{}", body.join(","))
}

/// Decode a stack written by [`encode_stack`] or by an older store.
///
/// # Errors
///
/// Returns [`HistoryError::Codec`] if any element is not a version
/// number.
pub fn decode_stack(text: &str) -> Result<Vec<Version>> {
    let body = text.strip_prefix(PREFIX_V1).unwrap_or(text).trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    body.split(',')
        .map(|item| {
            item.trim().parse::<Version>().map_err(|e| HistoryError::Codec {
                value: text.to_owned(),
                reason: format!("bad version {item:?}: {e}"),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_version_prefix() {
        assert_eq!(encode_stack(&[1, 2, 5]), "v1:1,2,5");
        assert_eq!(encode_stack(&[]), "v1:");
    }

    #[test]
    fn decodes_current_and_legacy_forms() {
        assert_eq!(decode_stack("v1:1,3").unwrap(), vec![1, 3]);
        assert_eq!(decode_stack("1,3").unwrap(), vec![1, 3]);
        assert_eq!(decode_stack("v1:").unwrap(), Vec::<Version>::new());
        assert_eq!(decode_stack("").unwrap(), Vec::<Version>::new());
    }

    #[test]
    fn rejects_non_numbers() {
        assert!(matches!(
            decode_stack("v1:1,x"),
            Err(HistoryError::Codec { .. })
        ));
        assert!(matches!(decode_stack("v2:1"), Err(HistoryError::Codec { .. })));
    }
}
