use crate::physics::{BodyHandle, Vector2};
use crate::registry::Entity;
use rand::Rng;
use shared::{
    state::{ID_ALPHABET, ID_LEN},
    truncate_coordinate, Animation, CoinState, EntityId, PersonState, Role, WallState,
};

/// Generates a random six character identifier
pub fn generate_id() -> EntityId {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; ID_LEN];
    for byte in &mut bytes {
        *byte = ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())];
    }
    EntityId::new(bytes)
}

/// A player avatar; position mirrors its physics body after every step
#[derive(Debug, Clone)]
pub struct Person {
    pub id: EntityId,
    pub body: BodyHandle,
    pub position: Vector2,
    pub speed: f32,
    pub role: Role,
    pub animation: Animation,
}

impl Person {
    pub fn new(id: EntityId, body: BodyHandle, position: Vector2, speed: f32, role: Role) -> Self {
        Self {
            id,
            body,
            position,
            speed,
            role,
            animation: Animation::Stay,
        }
    }

    pub fn is_hunter(&self) -> bool {
        self.role == Role::Hunter
    }
}

impl Entity for Person {
    type State = PersonState;

    fn id(&self) -> EntityId {
        self.id
    }

    fn state(&self) -> PersonState {
        PersonState {
            id: self.id,
            x: truncate_coordinate(self.position.x),
            y: truncate_coordinate(self.position.y),
            role: self.role,
            animation: self.animation,
        }
    }
}

/// Collectible token backed by a static sensor body
#[derive(Debug, Clone)]
pub struct Coin {
    pub id: EntityId,
    pub body: BodyHandle,
    pub position: Vector2,
}

impl Entity for Coin {
    type State = CoinState;

    fn id(&self) -> EntityId {
        self.id
    }

    fn state(&self) -> CoinState {
        CoinState {
            id: self.id,
            x: truncate_coordinate(self.position.x),
            y: truncate_coordinate(self.position.y),
        }
    }
}

/// Static obstacle; `x`/`y` is the top-left corner, the body sits at its center
#[derive(Debug, Clone)]
pub struct Wall {
    pub id: EntityId,
    pub body: BodyHandle,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Wall {
    pub fn center(&self) -> Vector2 {
        Vector2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl Entity for Wall {
    type State = WallState;

    fn id(&self) -> EntityId {
        self.id
    }

    fn state(&self) -> WallState {
        WallState {
            id: self.id,
            x: self.x,
            y: self.y,
            w: self.width,
            h: self.height,
        }
    }
}
