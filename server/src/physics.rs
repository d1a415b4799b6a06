//! Physics seam used by the world plus a small arcade backend.
//!
//! The world only needs to create and remove bodies, move them, and learn
//! which pairs of bodies *started* touching during a step. Anything that
//! implements [`PhysicsBackend`] can drive the simulation; [`ArcadePhysics`]
//! is the bundled top-down implementation (no gravity, axis-aligned boxes and
//! circles, solid boxes pushed apart along the shallowest axis).

use std::collections::{BTreeMap, HashSet};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen space.
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector, or zero for a zero vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Collision shape, positioned by its center
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Rect { width: f32, height: f32 },
    Circle { radius: f32 },
}

bitflags::bitflags! {
    /// Body behaviour flags; an empty set is a movable solid body
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BodyFlags: u8 {
        /// Never moved by the solver or by velocity
        const STATIC = 1 << 0;
        /// Reports contacts but never pushes or gets pushed
        const SENSOR = 1 << 1;
    }
}

/// Opaque handle of a body owned by a backend; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u64);

/// Two bodies that started touching during a step, `a < b`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionPair {
    pub a: BodyHandle,
    pub b: BodyHandle,
}

impl CollisionPair {
    pub fn new(first: BodyHandle, second: BodyHandle) -> Self {
        if first <= second {
            Self { a: first, b: second }
        } else {
            Self { a: second, b: first }
        }
    }
}

/// Rigid-body backend driven by the world
pub trait PhysicsBackend {
    fn create_body(&mut self, shape: Shape, position: Vector2, flags: BodyFlags) -> BodyHandle;

    /// Returns false if the handle was unknown
    fn remove_body(&mut self, handle: BodyHandle) -> bool;

    fn position(&self, handle: BodyHandle) -> Option<Vector2>;

    fn set_position(&mut self, handle: BodyHandle, position: Vector2);

    /// Velocity in distance units per second
    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vector2);

    /// Integrates `delta_ms` and returns the pairs whose contact began in
    /// this step
    fn step(&mut self, delta_ms: f32) -> Vec<CollisionPair>;
}

/// Distance within which an existing contact is considered still touching,
/// so bodies resting against each other do not re-fire contact starts
const CONTACT_SLOP: f32 = 0.5;

#[derive(Debug, Clone)]
struct Body {
    shape: Shape,
    position: Vector2,
    velocity: Vector2,
    flags: BodyFlags,
}

impl Body {
    fn is_static(&self) -> bool {
        self.flags.contains(BodyFlags::STATIC)
    }

    fn is_solid(&self) -> bool {
        !self.flags.contains(BodyFlags::SENSOR)
    }
}

/// Top-down arcade physics: kinematic integration, AABB/circle overlap tests
/// and shallow-axis separation of solid rectangles
#[derive(Debug, Default)]
pub struct ArcadePhysics {
    bodies: BTreeMap<BodyHandle, Body>,
    contacts: HashSet<CollisionPair>,
    next_handle: u64,
}

impl ArcadePhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// True if the two bodies currently overlap
    pub fn overlapping(&self, first: BodyHandle, second: BodyHandle) -> bool {
        match (self.bodies.get(&first), self.bodies.get(&second)) {
            (Some(a), Some(b)) => overlaps(a, b, 0.0),
            _ => false,
        }
    }

    fn separate(&mut self, pair: CollisionPair) {
        let (Some(a), Some(b)) = (self.bodies.get(&pair.a), self.bodies.get(&pair.b)) else {
            return;
        };
        if !a.is_solid() || !b.is_solid() || (a.is_static() && b.is_static()) {
            return;
        }
        let (
            Shape::Rect {
                width: wa,
                height: ha,
            },
            Shape::Rect {
                width: wb,
                height: hb,
            },
        ) = (a.shape, b.shape)
        else {
            return;
        };

        let dx = b.position.x - a.position.x;
        let dy = b.position.y - a.position.y;
        let overlap_x = (wa + wb) / 2.0 - dx.abs();
        let overlap_y = (ha + hb) / 2.0 - dy.abs();
        if overlap_x <= 0.0 || overlap_y <= 0.0 {
            return;
        }

        // Push along the shallowest axis, away from the other body
        let push = if overlap_x < overlap_y {
            Vector2::new(if dx >= 0.0 { overlap_x } else { -overlap_x }, 0.0)
        } else {
            Vector2::new(0.0, if dy >= 0.0 { overlap_y } else { -overlap_y })
        };

        let (share_a, share_b) = match (a.is_static(), b.is_static()) {
            (true, false) => (0.0, 1.0),
            (false, true) => (1.0, 0.0),
            _ => (0.5, 0.5),
        };

        if let Some(body) = self.bodies.get_mut(&pair.a) {
            body.position = body.position.add(&push.scale(-share_a));
        }
        if let Some(body) = self.bodies.get_mut(&pair.b) {
            body.position = body.position.add(&push.scale(share_b));
        }
    }
}

impl PhysicsBackend for ArcadePhysics {
    fn create_body(&mut self, shape: Shape, position: Vector2, flags: BodyFlags) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.bodies.insert(
            handle,
            Body {
                shape,
                position,
                velocity: Vector2::ZERO,
                flags,
            },
        );
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.contacts
            .retain(|pair| pair.a != handle && pair.b != handle);
        self.bodies.remove(&handle).is_some()
    }

    fn position(&self, handle: BodyHandle) -> Option<Vector2> {
        self.bodies.get(&handle).map(|body| body.position)
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vector2) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.position = position;
        }
    }

    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vector2) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.velocity = velocity;
        }
    }

    fn step(&mut self, delta_ms: f32) -> Vec<CollisionPair> {
        let dt = delta_ms / 1000.0;
        for body in self.bodies.values_mut() {
            if !body.is_static() && !body.velocity.is_zero() {
                body.position = body.position.add(&body.velocity.scale(dt));
            }
        }

        let handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        let mut touching = HashSet::new();
        let mut started = Vec::new();
        let mut penetrating = Vec::new();

        for (i, first) in handles.iter().enumerate() {
            for second in &handles[i + 1..] {
                let a = &self.bodies[first];
                let b = &self.bodies[second];
                if a.is_static() && b.is_static() {
                    continue;
                }

                let pair = CollisionPair::new(*first, *second);
                if overlaps(a, b, 0.0) {
                    if !self.contacts.contains(&pair) {
                        started.push(pair);
                    }
                    touching.insert(pair);
                    penetrating.push(pair);
                } else if self.contacts.contains(&pair) && overlaps(a, b, CONTACT_SLOP) {
                    touching.insert(pair);
                }
            }
        }

        for pair in penetrating {
            self.separate(pair);
        }

        self.contacts = touching;
        started
    }
}

fn overlaps(a: &Body, b: &Body, margin: f32) -> bool {
    match (a.shape, b.shape) {
        (
            Shape::Rect {
                width: wa,
                height: ha,
            },
            Shape::Rect {
                width: wb,
                height: hb,
            },
        ) => {
            (b.position.x - a.position.x).abs() < (wa + wb) / 2.0 + margin
                && (b.position.y - a.position.y).abs() < (ha + hb) / 2.0 + margin
        }
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            let dx = b.position.x - a.position.x;
            let dy = b.position.y - a.position.y;
            let reach = ra + rb + margin;
            dx * dx + dy * dy < reach * reach
        }
        (Shape::Rect { width, height }, Shape::Circle { radius }) => {
            rect_circle_overlap(a.position, width, height, b.position, radius + margin)
        }
        (Shape::Circle { radius }, Shape::Rect { width, height }) => {
            rect_circle_overlap(b.position, width, height, a.position, radius + margin)
        }
    }
}

fn rect_circle_overlap(
    rect: Vector2,
    width: f32,
    height: f32,
    center: Vector2,
    radius: f32,
) -> bool {
    let closest_x = center
        .x
        .clamp(rect.x - width / 2.0, rect.x + width / 2.0);
    let closest_y = center
        .y
        .clamp(rect.y - height / 2.0, rect.y + height / 2.0);
    let dx = center.x - closest_x;
    let dy = center.y - closest_y;
    dx * dx + dy * dy < radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const SQUARE: Shape = Shape::Rect {
        width: 10.0,
        height: 10.0,
    };

    #[test]
    fn test_vector_normalize() {
        let v = Vector2::new(3.0, 4.0);
        assert_eq!(v.magnitude(), 5.0);
        let n = v.normalize();
        assert_approx_eq!(n.x, 0.6, 1e-6);
        assert_approx_eq!(n.y, 0.8, 1e-6);
        assert_eq!(Vector2::ZERO.normalize(), Vector2::ZERO);
    }

    #[test]
    fn test_handles_are_not_reused() {
        let mut physics = ArcadePhysics::new();
        let first = physics.create_body(SQUARE, Vector2::ZERO, BodyFlags::empty());
        assert!(physics.remove_body(first));
        assert!(!physics.remove_body(first));
        let second = physics.create_body(SQUARE, Vector2::ZERO, BodyFlags::empty());
        assert_ne!(first, second);
        assert_eq!(physics.len(), 1);
    }

    #[test]
    fn test_collision_start_fires_once() {
        let mut physics = ArcadePhysics::new();
        let sensor = physics.create_body(
            Shape::Circle { radius: 10.0 },
            Vector2::new(50.0, 50.0),
            BodyFlags::STATIC | BodyFlags::SENSOR,
        );
        let mover = physics.create_body(SQUARE, Vector2::new(20.0, 50.0), BodyFlags::empty());

        assert!(physics.step(20.0).is_empty());

        physics.set_position(mover, Vector2::new(44.0, 50.0));
        let started = physics.step(20.0);
        assert_eq!(started, vec![CollisionPair::new(sensor, mover)]);

        // Still overlapping: no new start
        assert!(physics.step(20.0).is_empty());

        // Leave and come back: a new start
        physics.set_position(mover, Vector2::new(0.0, 0.0));
        assert!(physics.step(20.0).is_empty());
        physics.set_position(mover, Vector2::new(50.0, 50.0));
        assert_eq!(physics.step(20.0).len(), 1);
    }

    #[test]
    fn test_sensor_does_not_push() {
        let mut physics = ArcadePhysics::new();
        physics.create_body(
            Shape::Circle { radius: 10.0 },
            Vector2::new(50.0, 50.0),
            BodyFlags::STATIC | BodyFlags::SENSOR,
        );
        let mover = physics.create_body(SQUARE, Vector2::new(50.0, 50.0), BodyFlags::empty());
        physics.step(20.0);
        assert_eq!(physics.position(mover), Some(Vector2::new(50.0, 50.0)));
    }

    #[test]
    fn test_static_wall_pushes_body_out() {
        let mut physics = ArcadePhysics::new();
        physics.create_body(
            Shape::Rect {
                width: 100.0,
                height: 20.0,
            },
            Vector2::new(50.0, 10.0),
            BodyFlags::STATIC,
        );
        // Penetrates 4 units into the bottom face of the wall
        let mover = physics.create_body(SQUARE, Vector2::new(50.0, 21.0), BodyFlags::empty());

        let started = physics.step(20.0);
        assert_eq!(started.len(), 1);

        let position = physics.position(mover).unwrap();
        assert_approx_eq!(position.x, 50.0, 1e-4);
        assert_approx_eq!(position.y, 25.0, 1e-4);

        // Resting against the wall keeps the contact alive
        assert!(physics.step(20.0).is_empty());
    }

    #[test]
    fn test_dynamic_bodies_share_separation() {
        let mut physics = ArcadePhysics::new();
        let left = physics.create_body(SQUARE, Vector2::new(0.0, 0.0), BodyFlags::empty());
        let right = physics.create_body(SQUARE, Vector2::new(6.0, 0.0), BodyFlags::empty());

        assert_eq!(physics.step(20.0).len(), 1);
        assert_approx_eq!(physics.position(left).unwrap().x, -2.0, 1e-4);
        assert_approx_eq!(physics.position(right).unwrap().x, 8.0, 1e-4);
        assert!(!physics.overlapping(left, right));
    }

    #[test]
    fn test_velocity_integration() {
        let mut physics = ArcadePhysics::new();
        let body = physics.create_body(SQUARE, Vector2::ZERO, BodyFlags::empty());
        physics.set_velocity(body, Vector2::new(100.0, -50.0));
        physics.step(20.0);
        let position = physics.position(body).unwrap();
        assert_approx_eq!(position.x, 2.0, 1e-4);
        assert_approx_eq!(position.y, -1.0, 1e-4);
    }
}
