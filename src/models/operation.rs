use serde::{Deserialize, Serialize};

use crate::sync::error::SyncError;

/// A position-addressed text operation against canonical document content.
///
/// Positions are character offsets. An operation is validated and applied
/// against the server-canonical content at the moment it is dequeued, never
/// against the client's local view (literal-position policy).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum TextOperation {
    #[serde(rename = "insert")]
    Insert { position: usize, content: String },
    #[serde(rename = "delete")]
    Delete { position: usize, length: usize },
}

impl TextOperation {
    pub fn position(&self) -> usize {
        match self {
            TextOperation::Insert { position, .. } => *position,
            TextOperation::Delete { position, .. } => *position,
        }
    }

    /// Reject operations that are malformed independently of document state.
    /// Bounds against the current content are checked in `apply_to`.
    pub fn validate(&self) -> Result<(), SyncError> {
        match self {
            TextOperation::Insert { content, .. } if content.is_empty() => Err(
                SyncError::Validation("insert operation requires non-empty content".to_string()),
            ),
            TextOperation::Delete { length, .. } if *length == 0 => Err(SyncError::Validation(
                "delete operation requires a non-zero length".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Splice this operation into `content`, returning the new content.
    ///
    /// Fails with a `Validation` error when the position (or position+length
    /// for deletes) falls outside the current content.
    pub fn apply_to(&self, content: &str) -> Result<String, SyncError> {
        let char_len = content.chars().count();
        match self {
            TextOperation::Insert {
                position,
                content: text,
            } => {
                if *position > char_len {
                    return Err(SyncError::Validation(format!(
                        "insert position {} is out of bounds (content length {})",
                        position, char_len
                    )));
                }
                let at = byte_offset(content, *position);
                let mut next = String::with_capacity(content.len() + text.len());
                next.push_str(&content[..at]);
                next.push_str(text);
                next.push_str(&content[at..]);
                Ok(next)
            }
            TextOperation::Delete { position, length } => {
                if position + length > char_len {
                    return Err(SyncError::Validation(format!(
                        "delete range {}..{} is out of bounds (content length {})",
                        position,
                        position + length,
                        char_len
                    )));
                }
                let start = byte_offset(content, *position);
                let end = byte_offset(content, position + length);
                let mut next = String::with_capacity(content.len() - (end - start));
                next.push_str(&content[..start]);
                next.push_str(&content[end..]);
                Ok(next)
            }
        }
    }
}

/// Byte offset of the `char_pos`-th character; `content.len()` when the
/// position points one past the last character.
fn byte_offset(content: &str, char_pos: usize) -> usize {
    content
        .char_indices()
        .nth(char_pos)
        .map(|(i, _)| i)
        .unwrap_or(content.len())
}
