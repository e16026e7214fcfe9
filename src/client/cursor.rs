//! Opaque query cursors
//!
//! Format:
//! ```text
//! ┌──────────────────────────┬───────────┐
//! │ bincode(CursorState)     │ CRC32 (4) │
//! └──────────────────────────┴───────────┘
//! ```
//! The checksum catches cursors that were truncated or hand-edited.

use serde::{Deserialize, Serialize};

use super::{RemoteError, RemoteResult};

const CRC_LEN: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
struct CursorState {
    /// Results consumed past the query offset
    position: u64,
}

/// Resume point of a paged query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    /// Cursor positioned after `position` results
    pub fn at(position: usize) -> RemoteResult<Self> {
        let state = CursorState {
            position: position as u64,
        };
        let mut bytes = bincode::serialize(&state)
            .map_err(|e| RemoteError::InvalidArgument(format!("cursor encoding: {}", e)))?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode and verify the position this cursor points at
    pub fn position(&self) -> RemoteResult<usize> {
        if self.0.len() < CRC_LEN {
            return Err(RemoteError::InvalidArgument("cursor too short".to_string()));
        }
        let (payload, crc) = self.0.split_at(self.0.len() - CRC_LEN);
        let mut expected = [0u8; CRC_LEN];
        expected.copy_from_slice(crc);
        if crc32fast::hash(payload) != u32::from_le_bytes(expected) {
            return Err(RemoteError::InvalidArgument(
                "cursor checksum mismatch".to_string(),
            ));
        }
        let state: CursorState = bincode::deserialize(payload)
            .map_err(|e| RemoteError::InvalidArgument(format!("cursor decoding: {}", e)))?;
        Ok(state.position as usize)
    }
}
