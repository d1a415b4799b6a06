//! Entity identifiers and the serializable state records that travel in patches

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bytes in an entity or snapshot identifier
pub const ID_LEN: usize = 6;

/// Alphabet used for generated identifiers (URL-safe, 64 symbols)
pub const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Stable six character identifier assigned once when an entity is created
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId([u8; ID_LEN]);

impl EntityId {
    pub const fn new(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Parses an identifier from text, accepting only alphabet symbols
    pub fn parse(text: &str) -> Option<Self> {
        let bytes: [u8; ID_LEN] = text.as_bytes().try_into().ok()?;
        if bytes.iter().all(|b| ID_ALPHABET.contains(b)) {
            Some(Self(bytes))
        } else {
            None
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self)
    }
}

/// Server-assigned identifier of one network connection
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything addressable by an [`EntityId`]
pub trait Identified {
    fn id(&self) -> EntityId;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    Runner,
    Hunter,
}

impl Role {
    pub fn ordinal(self) -> u8 {
        match self {
            Role::Runner => 0,
            Role::Hunter => 1,
        }
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            0 => Some(Role::Runner),
            1 => Some(Role::Hunter),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Animation {
    #[default]
    Stay,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
}

impl Animation {
    pub const ALL: [Animation; 5] = [
        Animation::Stay,
        Animation::MoveUp,
        Animation::MoveDown,
        Animation::MoveLeft,
        Animation::MoveRight,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            Animation::Stay => 0,
            Animation::MoveUp => 1,
            Animation::MoveDown => 2,
            Animation::MoveLeft => 3,
            Animation::MoveRight => 4,
        }
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }
}

/// Movement keys a player can hold
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    W,
    S,
    A,
    D,
}

impl Direction {
    /// Evaluation order used by the simulation; later entries win the animation
    pub const ALL: [Direction; 4] = [Direction::W, Direction::S, Direction::A, Direction::D];

    /// Unit vector in screen coordinates (y grows downwards)
    pub fn vector(self) -> (f32, f32) {
        match self {
            Direction::W => (0.0, -1.0),
            Direction::S => (0.0, 1.0),
            Direction::A => (-1.0, 0.0),
            Direction::D => (1.0, 0.0),
        }
    }

    pub fn animation(self) -> Animation {
        match self {
            Direction::W => Animation::MoveUp,
            Direction::S => Animation::MoveDown,
            Direction::A => Animation::MoveLeft,
            Direction::D => Animation::MoveRight,
        }
    }

    pub fn from_char(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'w' => Some(Direction::W),
            's' => Some(Direction::S),
            'a' => Some(Direction::A),
            'd' => Some(Direction::D),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonState {
    pub id: EntityId,
    pub x: i64,
    pub y: i64,
    pub role: Role,
    pub animation: Animation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinState {
    pub id: EntityId,
    pub x: i64,
    pub y: i64,
}

/// Wall rectangle; `x`/`y` is the top-left corner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallState {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Identified for PersonState {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Identified for CoinState {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Identified for WallState {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// Truncates a simulation coordinate to the integer grid used on the wire
pub fn truncate_coordinate(value: f32) -> i64 {
    value.floor() as i64
}
