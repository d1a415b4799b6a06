//! Fixed binary layout of the per-tick snapshot broadcast on the unreliable
//! channel.
//!
//! ```text
//! snapshot:
//!   id          [u8; 6]
//!   time        u64        milliseconds
//!   persons     u64 count, then `count` records of:
//!     id          [u8; 6]
//!     x           i64
//!     y           i64
//!     role        u8
//!     animation   u8
//! ```
//!
//! All integers are little-endian with no padding. Only persons are carried;
//! coins change rarely and travel exclusively through reliable patches.

use crate::state::{Animation, EntityId, PersonState, Role, ID_LEN};
use serde::{Deserialize, Serialize};

/// Bytes before the first person record: id, time and the array length
pub const SNAPSHOT_HEADER_LEN: usize = ID_LEN + 8 + 8;

/// Bytes of one encoded person record
pub const PERSON_RECORD_LEN: usize = ID_LEN + 8 + 8 + 1 + 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot buffer of {0} bytes is shorter than the header")]
    Truncated(usize),
    #[error("snapshot length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("snapshot codec failure: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: EntityId,
    pub x: i64,
    pub y: i64,
    pub role: u8,
    pub animation: u8,
}

impl From<&PersonState> for PersonRecord {
    fn from(state: &PersonState) -> Self {
        Self {
            id: state.id,
            x: state.x,
            y: state.y,
            role: state.role.ordinal(),
            animation: state.animation.ordinal(),
        }
    }
}

impl PersonRecord {
    /// Converts back to a full state; unknown ordinals fall back to defaults
    pub fn to_state(&self) -> PersonState {
        PersonState {
            id: self.id,
            x: self.x,
            y: self.y,
            role: Role::from_ordinal(self.role).unwrap_or_default(),
            animation: Animation::from_ordinal(self.animation).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub persons: Vec<PersonRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: EntityId,
    pub time: u64,
    pub state: SnapshotState,
}

impl Snapshot {
    pub fn new(id: EntityId, time: u64, persons: &[PersonState]) -> Self {
        Self {
            id,
            time,
            state: SnapshotState {
                persons: persons.iter().map(PersonRecord::from).collect(),
            },
        }
    }

    /// Exact encoded size for a snapshot carrying `persons` records
    pub fn encoded_len(persons: usize) -> usize {
        SNAPSHOT_HEADER_LEN + persons * PERSON_RECORD_LEN
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let bytes = bincode::serialize(self)?;
        debug_assert_eq!(bytes.len(), Self::encoded_len(self.state.persons.len()));
        Ok(bytes)
    }

    /// Decodes a buffer, rejecting any whose length disagrees with the
    /// declared person count
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < SNAPSHOT_HEADER_LEN {
            return Err(SnapshotError::Truncated(bytes.len()));
        }

        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[ID_LEN + 8..SNAPSHOT_HEADER_LEN]);
        let expected = usize::try_from(u64::from_le_bytes(count))
            .ok()
            .and_then(|count| count.checked_mul(PERSON_RECORD_LEN))
            .and_then(|body| body.checked_add(SNAPSHOT_HEADER_LEN))
            .unwrap_or(usize::MAX);

        if expected != bytes.len() {
            return Err(SnapshotError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        Ok(bincode::deserialize(bytes)?)
    }
}
