//! Reliable message types and the length-prefixed frame codec used on the
//! stream channel. Datagrams sent by clients on the unreliable channel are
//! also defined here; snapshots live in [`crate::snapshot`].

use crate::options::Options;
use crate::state::{CoinState, ConnectionId, Direction, EntityId, PersonState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest accepted frame payload
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Delta for one named entity collection; `None` means "no change" for
/// that operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPatch<S> {
    pub add: Option<Vec<S>>,
    pub upd: Option<Vec<S>>,
    pub del: Option<Vec<EntityId>>,
}

impl<S> Default for CollectionPatch<S> {
    fn default() -> Self {
        Self {
            add: None,
            upd: None,
            del: None,
        }
    }
}

impl<S> CollectionPatch<S> {
    pub fn added(states: Vec<S>) -> Self {
        Self {
            add: Some(states),
            ..Self::default()
        }
    }

    pub fn updated(states: Vec<S>) -> Self {
        Self {
            upd: Some(states),
            ..Self::default()
        }
    }

    pub fn deleted(ids: Vec<EntityId>) -> Self {
        Self {
            del: Some(ids),
            ..Self::default()
        }
    }

    /// True when no operation carries anything
    pub fn is_empty(&self) -> bool {
        self.add.as_ref().map_or(true, Vec::is_empty)
            && self.upd.as_ref().map_or(true, Vec::is_empty)
            && self.del.as_ref().map_or(true, Vec::is_empty)
    }
}

/// Patch message body: at most one collection delta per named collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub persons: Option<CollectionPatch<PersonState>>,
    pub coins: Option<CollectionPatch<CoinState>>,
}

impl Patch {
    pub fn persons(patch: CollectionPatch<PersonState>) -> Self {
        Self {
            persons: Some(patch),
            coins: None,
        }
    }

    pub fn coins(patch: CollectionPatch<CoinState>) -> Self {
        Self {
            persons: None,
            coins: Some(patch),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.persons.as_ref().map_or(true, CollectionPatch::is_empty)
            && self.coins.as_ref().map_or(true, CollectionPatch::is_empty)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub direction: Direction,
    pub pressed: bool,
}

/// Reliable messages from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Sent once to a freshly joined connection: static options plus the
    /// full current state expressed as additions
    Init {
        connection: ConnectionId,
        options: Options,
        patch: Patch,
    },
    Patch(Patch),
    Rejected {
        reason: String,
    },
}

/// Reliable messages from a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    Key(KeyInput),
    Leave,
}

/// Client datagrams on the unreliable channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datagram {
    /// Binds the sender's address to a connection for snapshot delivery
    Hello { connection: ConnectionId },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("codec failure: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializes a message into a frame ready to be written to a stream
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Reads one frame payload; `Ok(None)` signals a clean end of stream
///
/// Not cancellation safe: drive it from a dedicated task.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    Ok(bincode::deserialize(payload)?)
}
