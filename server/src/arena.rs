//! Built-in arena: static options sent to clients and the simulation layout
//! (walls, coin positions, spawn points).

use crate::physics::Vector2;
use shared::{
    Animation, AnimationFrames, MapOptions, Options, Role, SpriteSheet, TileLayer, Tileset,
    TilesetImage, COIN_RADIUS, PERSON_SIZE, WORLD_HEIGHT, WORLD_WIDTH,
};

const TILE_SIZE: u32 = 16;
const BORDER: f32 = 16.0;
const COIN_SPACING: f32 = 80.0;

/// Axis-aligned wall given by its top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl WallRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True if a circle of `radius` at `point` would touch this wall
    pub fn near(&self, point: Vector2, radius: f32) -> bool {
        point.x + radius > self.x
            && point.x - radius < self.x + self.width
            && point.y + radius > self.y
            && point.y - radius < self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArenaLayout {
    pub coins: Vec<Vector2>,
    pub walls: Vec<WallRect>,
    pub victim_spawn: Vector2,
    pub hunter_spawn: Vector2,
}

impl ArenaLayout {
    /// Border walls, four interior blocks and a grid of coins between them
    pub fn classic(width: f32, height: f32) -> Self {
        let mut walls = vec![
            WallRect::new(0.0, 0.0, width, BORDER),
            WallRect::new(0.0, height - BORDER, width, BORDER),
            WallRect::new(0.0, 0.0, BORDER, height),
            WallRect::new(width - BORDER, 0.0, BORDER, height),
        ];
        let block_w = width * 0.15;
        let block_h = 24.0;
        for (fx, fy) in [(0.25, 0.3), (0.6, 0.3), (0.25, 0.7), (0.6, 0.7)] {
            walls.push(WallRect::new(width * fx, height * fy, block_w, block_h));
        }

        let victim_spawn = Vector2::new(BORDER + 2.0 * PERSON_SIZE, height / 2.0);
        let hunter_spawn = Vector2::new(width - BORDER - 2.0 * PERSON_SIZE, height / 2.0);

        let mut coins = Vec::new();
        let mut y = BORDER + COIN_SPACING / 2.0;
        while y < height - BORDER {
            let mut x = BORDER + COIN_SPACING;
            while x < width - BORDER - COIN_SPACING / 2.0 {
                let point = Vector2::new(x, y);
                let blocked = walls.iter().any(|wall| wall.near(point, COIN_RADIUS));
                let at_spawn = [victim_spawn, hunter_spawn].iter().any(|spawn| {
                    (spawn.x - x).abs() < COIN_SPACING / 2.0 && (spawn.y - y).abs() < COIN_SPACING / 2.0
                });
                if !blocked && !at_spawn {
                    coins.push(point);
                }
                x += COIN_SPACING;
            }
            y += COIN_SPACING;
        }

        Self {
            coins,
            walls,
            victim_spawn,
            hunter_spawn,
        }
    }
}

impl Default for ArenaLayout {
    fn default() -> Self {
        Self::classic(WORLD_WIDTH as f32, WORLD_HEIGHT as f32)
    }
}

/// Static options for the classic arena at the given tick rate
pub fn default_options(fps: u32) -> Options {
    let columns = WORLD_WIDTH / TILE_SIZE;
    let rows = WORLD_HEIGHT / TILE_SIZE;

    // Floor everywhere, border tiles on the edge layer
    let floor = vec![1; (columns * rows) as usize];
    let edge = (0..rows)
        .flat_map(|row| {
            (0..columns).map(move |column| {
                if row == 0 || row == rows - 1 || column == 0 || column == columns - 1 {
                    2
                } else {
                    0
                }
            })
        })
        .collect();

    Options {
        fps,
        width: WORLD_WIDTH,
        height: WORLD_HEIGHT,
        sprites: vec![
            sprite_sheet(Role::Runner, "/images/man.png"),
            sprite_sheet(Role::Hunter, "/images/ghost.png"),
        ],
        map: MapOptions {
            tileset: Tileset {
                tile_width: TILE_SIZE,
                tile_height: TILE_SIZE,
                image: TilesetImage {
                    url: "/images/tileset.png".to_string(),
                    width: 128,
                    height: 128,
                },
            },
            width: columns,
            height: rows,
            layers: vec![
                TileLayer {
                    z_index: 0,
                    tiles: floor,
                },
                TileLayer {
                    z_index: 1,
                    tiles: edge,
                },
            ],
        },
    }
}

/// Three-frame walk cycles on a 32px grid, one row per direction
fn sprite_sheet(role: Role, url: &str) -> SpriteSheet {
    let walk = |row: u32| AnimationFrames {
        animation: match row {
            0 => Animation::MoveUp,
            1 => Animation::MoveRight,
            2 => Animation::MoveDown,
            _ => Animation::MoveLeft,
        },
        speed: 0.1,
        frames: (0..3).map(|column| [column * 32, row * 32, 32, 32]).collect(),
    };

    let mut animations = vec![AnimationFrames {
        animation: Animation::Stay,
        speed: 0.0,
        frames: vec![[32, 64, 32, 32]],
    }];
    animations.extend((0..4).map(walk));

    SpriteSheet {
        role,
        url: url.to_string(),
        animations,
    }
}
