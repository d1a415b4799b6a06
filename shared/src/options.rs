//! Static arena configuration shipped to every client in the `init` message

use crate::state::{Animation, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Simulation ticks per second
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub sprites: Vec<SpriteSheet>,
    pub map: MapOptions,
}

impl Options {
    /// Fixed simulation step in milliseconds
    pub fn tick_ms(&self) -> f32 {
        1000.0 / self.fps.max(1) as f32
    }

    pub fn sprite_sheet(&self, role: Role) -> Option<&SpriteSheet> {
        self.sprites.iter().find(|sheet| sheet.role == role)
    }
}

/// Frames of one person sprite, keyed by animation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteSheet {
    pub role: Role,
    pub url: String,
    pub animations: Vec<AnimationFrames>,
}

impl SpriteSheet {
    pub fn frames(&self, animation: Animation) -> Option<&AnimationFrames> {
        self.animations
            .iter()
            .find(|frames| frames.animation == animation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationFrames {
    pub animation: Animation,
    /// Playback speed in frames per render tick; zero holds the first frame
    pub speed: f32,
    /// Source rectangles as `[x, y, width, height]`
    pub frames: Vec<[u32; 4]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapOptions {
    pub tileset: Tileset,
    /// Map size in tiles
    pub width: u32,
    pub height: u32,
    pub layers: Vec<TileLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tileset {
    pub tile_width: u32,
    pub tile_height: u32,
    pub image: TilesetImage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilesetImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileLayer {
    pub z_index: i32,
    /// Row-major tile indices, `0` meaning empty
    pub tiles: Vec<u32>,
}
