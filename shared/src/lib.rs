//! Protocol vocabulary shared by the tag arena server and its clients.
//!
//! Two channels connect a client to the server:
//! - a reliable, ordered stream carrying [`protocol::ServerMessage`] and
//!   [`protocol::ClientMessage`] frames (init, add/upd/del patches, key input)
//! - an unreliable datagram channel carrying one binary
//!   [`snapshot::Snapshot`] per simulation tick

pub mod options;
pub mod protocol;
pub mod snapshot;
pub mod state;

pub use options::{AnimationFrames, MapOptions, Options, SpriteSheet, TileLayer, Tileset, TilesetImage};
pub use protocol::{
    ClientMessage, CollectionPatch, Datagram, KeyInput, Patch, ProtocolError,
    ServerMessage,
};
pub use snapshot::{PersonRecord, Snapshot, SnapshotError};
pub use state::{
    truncate_coordinate, Animation, CoinState, ConnectionId, Direction, EntityId, Identified,
    PersonState, Role, WallState,
};

pub const DEFAULT_FPS: u32 = 50;
pub const WORLD_WIDTH: u32 = 800;
pub const WORLD_HEIGHT: u32 = 600;

/// Runner movement speed; hunters derive theirs from the population
pub const RUNNER_SPEED: f32 = 10.0;
/// Side length of a person's square body
pub const PERSON_SIZE: f32 = 10.0;
pub const COIN_RADIUS: f32 = 10.0;

/// Server frames of artificial delay clients render behind the newest snapshot
pub const INTERPOLATION_FRAMES: u32 = 3;

/// Hunter speed for a given number of persons in the arena
pub fn hunter_speed(person_count: usize) -> f32 {
    11usize.saturating_sub(person_count).max(1) as f32
}

/// Milliseconds since the unix epoch, saturating instead of failing
pub fn now_ms() -> u64 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(std::time::Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hunter_speed_formula() {
        assert_eq!(hunter_speed(1), 10.0);
        assert_eq!(hunter_speed(2), 9.0);
        assert_eq!(hunter_speed(10), 1.0);
        assert_eq!(hunter_speed(11), 1.0);
        assert_eq!(hunter_speed(40), 1.0);
    }

    #[test]
    fn test_now_ms_advances() {
        let before = now_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(now_ms() > before);
    }
}
