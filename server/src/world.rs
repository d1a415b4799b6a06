//! Authoritative simulation state.
//!
//! The world owns the entity registries, the physics backend and the input
//! buffered for each linked connection. Nothing here touches the network:
//! membership changes surface through registry subscriptions, and field
//! changes that clients must learn about (role, animation) are published with
//! [`EntityRegistry::notify_updated`].

use crate::arena::ArenaLayout;
use crate::entity::{generate_id, Coin, Person, Wall};
use crate::physics::{BodyFlags, BodyHandle, CollisionPair, PhysicsBackend, Shape, Vector2};
use crate::registry::EntityRegistry;
use log::{debug, info};
use shared::{
    hunter_speed, Animation, ConnectionId, Direction, EntityId, KeyInput, Options, Role,
    COIN_RADIUS, PERSON_SIZE, RUNNER_SPEED,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// What a physics body stands for in the game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Person(EntityId),
    Coin(EntityId),
    Wall(EntityId),
}

/// Input buffered for one connection until the next update
#[derive(Debug, Clone)]
pub struct Player {
    pub person: EntityId,
    pub keys: HashSet<Direction>,
}

impl Player {
    fn new(person: EntityId) -> Self {
        Self {
            person,
            keys: HashSet::new(),
        }
    }

    /// Summed unit vectors of the held keys and the animation they select
    fn force(&self) -> (Vector2, Animation) {
        let mut force = Vector2::ZERO;
        let mut animation = Animation::Stay;
        for direction in Direction::ALL {
            if self.keys.contains(&direction) {
                let (x, y) = direction.vector();
                force = force.add(&Vector2::new(x, y));
                animation = direction.animation();
            }
        }
        (force, animation)
    }
}

/// The arena and everything in it
///
/// Persons, coins and walls live in separate registries, each backed by a
/// physics body that maps back to its entity through [`BodyKind`]. Connections
/// steer persons only through buffered key state, which is consumed on the
/// next [`World::update`].
pub struct World {
    options: Options,
    layout: ArenaLayout,
    physics: Box<dyn PhysicsBackend + Send>,
    bodies: HashMap<BodyHandle, BodyKind>,
    persons: EntityRegistry<Person>,
    coins: EntityRegistry<Coin>,
    walls: EntityRegistry<Wall>,
    players: BTreeMap<ConnectionId, Player>,
}

impl World {
    /// Builds the walls and the initial coin set of `layout`
    ///
    /// The world starts without persons. Walls are static bodies and never
    /// change afterwards.
    pub fn new(
        options: Options,
        layout: ArenaLayout,
        physics: Box<dyn PhysicsBackend + Send>,
    ) -> Self {
        let mut world = Self {
            options,
            layout,
            physics,
            bodies: HashMap::new(),
            persons: EntityRegistry::new("persons"),
            coins: EntityRegistry::new("coins"),
            walls: EntityRegistry::new("walls"),
            players: BTreeMap::new(),
        };

        let walls: Vec<Wall> = world
            .layout
            .walls
            .clone()
            .into_iter()
            .map(|rect| {
                let id = generate_id();
                let center = Vector2::new(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
                let body = world.physics.create_body(
                    Shape::Rect {
                        width: rect.width,
                        height: rect.height,
                    },
                    center,
                    BodyFlags::STATIC,
                );
                world.bodies.insert(body, BodyKind::Wall(id));
                Wall {
                    id,
                    body,
                    x: rect.x,
                    y: rect.y,
                    width: rect.width,
                    height: rect.height,
                }
            })
            .collect();
        world.walls.add(walls);
        world.regenerate_coins();

        info!(
            "World ready: {} walls, {} coins",
            world.walls.len(),
            world.coins.len()
        );
        world
    }

    /// Static options sent to every client in its `init` message
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn layout(&self) -> &ArenaLayout {
        &self.layout
    }

    pub fn persons(&self) -> &EntityRegistry<Person> {
        &self.persons
    }

    /// Mutable registry access, used to subscribe to person changes
    ///
    /// Adding or deleting persons here bypasses physics and role
    /// assignment. Use [`World::create_person`] and [`World::remove_person`]
    /// instead.
    pub fn persons_mut(&mut self) -> &mut EntityRegistry<Person> {
        &mut self.persons
    }

    pub fn coins(&self) -> &EntityRegistry<Coin> {
        &self.coins
    }

    pub fn coins_mut(&mut self) -> &mut EntityRegistry<Coin> {
        &mut self.coins
    }

    pub fn walls(&self) -> &EntityRegistry<Wall> {
        &self.walls
    }

    /// Entity behind a physics body, or `None` for a removed body
    pub fn body_kind(&self, handle: BodyHandle) -> Option<BodyKind> {
        self.bodies.get(&handle).copied()
    }

    /// Id of the current hunter, if any
    pub fn hunter(&self) -> Option<EntityId> {
        self.persons
            .iter()
            .find(|person| person.is_hunter())
            .map(|person| person.id)
    }

    /// Advances the simulation by one fixed step
    ///
    /// Each linked person moves `delta_ms / 100 * speed` pixels along the
    /// normalized sum of its held directions, then physics resolves
    /// overlaps. Contacts that started during this step are handled last:
    /// a runner touching a coin collects it, and a runner touching the
    /// hunter takes over the role. Animation changes are published as one
    /// update event; positions are left to snapshots.
    pub fn update(&mut self, delta_ms: f32) {
        let mut animated = Vec::new();

        for player in self.players.values() {
            let Some(person) = self.persons.get_mut(player.person) else {
                continue;
            };

            let (force, animation) = player.force();
            if person.animation != animation {
                person.animation = animation;
                animated.push(person.id);
            }
            if force.is_zero() {
                continue;
            }

            let displacement = force.normalize().scale(delta_ms / 100.0 * person.speed);
            let current = self
                .physics
                .position(person.body)
                .unwrap_or(person.position);
            self.physics
                .set_position(person.body, current.add(&displacement));
        }

        let started = self.physics.step(delta_ms);

        for person in self.persons.iter_mut() {
            if let Some(position) = self.physics.position(person.body) {
                person.position = position;
            }
        }
        self.persons.notify_updated(animated);

        for pair in started {
            self.resolve_collision(pair);
        }
    }

    /// Where the next joining person should appear.
    ///
    /// The first person into an empty arena starts at the victim spawn.
    /// Every later joiner enters at the hunter spawn, whatever role it is
    /// given.
    pub fn spawn_point_for_next_person(&self) -> Vector2 {
        if !self.persons.is_empty() {
            self.layout.hunter_spawn
        } else {
            self.layout.victim_spawn
        }
    }

    fn next_role(&self) -> Role {
        if !self.persons.is_empty() && self.hunter().is_none() {
            Role::Hunter
        } else {
            Role::Runner
        }
    }

    /// Adds a person at `position` and returns its id
    ///
    /// The newcomer becomes Hunter when others are present and none of
    /// them hunts, otherwise it runs. The hunter's speed is recomputed for
    /// the new head count. The person is not linked to any connection.
    pub fn create_person(&mut self, position: Vector2) -> EntityId {
        let role = self.next_role();
        let id = generate_id();
        let body = self.physics.create_body(
            Shape::Rect {
                width: PERSON_SIZE,
                height: PERSON_SIZE,
            },
            position,
            BodyFlags::empty(),
        );
        self.bodies.insert(body, BodyKind::Person(id));

        let speed = match role {
            Role::Hunter => hunter_speed(self.persons.len() + 1),
            Role::Runner => RUNNER_SPEED,
        };
        self.persons
            .add([Person::new(id, body, position, speed, role)]);
        self.refresh_hunter_speed();

        info!(
            "Person {} joined as {:?} ({} in arena)",
            id,
            role,
            self.persons.len()
        );
        id
    }

    /// Removes a person, its body and any connection steering it
    ///
    /// When the hunter leaves and at least two persons remain, the earliest
    /// joiner inherits the role and is moved to the hunter spawn. Returns
    /// false if the person was already gone.
    pub fn remove_person(&mut self, id: EntityId) -> bool {
        let Some(person) = self.persons.delete([id]).pop() else {
            return false;
        };
        self.physics.remove_body(person.body);
        self.bodies.remove(&person.body);
        self.players.retain(|_, player| player.person != id);

        if person.is_hunter() && self.persons.len() >= 2 {
            if let Some(&heir) = self.persons.ids().first() {
                self.set_role(heir, Role::Hunter);
                self.teleport_person(heir, self.layout.hunter_spawn);
                self.persons.notify_updated([heir]);
                info!("Person {} inherits the hunter role", heir);
            }
        }
        self.refresh_hunter_speed();

        info!("Person {} left ({} in arena)", id, self.persons.len());
        true
    }

    /// Spawns one coin per configured position
    ///
    /// Coins are static sensors. Returns the ids of the new coins.
    pub fn regenerate_coins(&mut self) -> Vec<EntityId> {
        let coins: Vec<Coin> = self
            .layout
            .coins
            .clone()
            .into_iter()
            .map(|position| {
                let id = generate_id();
                let body = self.physics.create_body(
                    Shape::Circle {
                        radius: COIN_RADIUS,
                    },
                    position,
                    BodyFlags::STATIC | BodyFlags::SENSOR,
                );
                self.bodies.insert(body, BodyKind::Coin(id));
                Coin { id, body, position }
            })
            .collect();

        let added = self.coins.add(coins);
        debug!("Regenerated {} coins", added.len());
        added
    }

    /// Returns false if the coin was already gone; never regenerates
    pub fn remove_coin(&mut self, id: EntityId) -> bool {
        let Some(coin) = self.coins.delete([id]).pop() else {
            return false;
        };
        self.physics.remove_body(coin.body);
        self.bodies.remove(&coin.body);
        true
    }

    /// Gives `connection` control of `person` with no keys held
    ///
    /// Linking an already linked connection replaces its previous person
    /// and clears its keys.
    pub fn link_player(&mut self, connection: ConnectionId, person: EntityId) {
        self.players.insert(connection, Player::new(person));
    }

    /// Forgets the connection and returns the person it controlled
    pub fn unlink_player(&mut self, connection: ConnectionId) -> Option<EntityId> {
        self.players.remove(&connection).map(|player| player.person)
    }

    pub fn player_person(&self, connection: ConnectionId) -> Option<EntityId> {
        self.players.get(&connection).map(|player| player.person)
    }

    /// Number of linked connections
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Buffers a key transition for the next update
    ///
    /// Pressing an already held key or releasing a free one has no effect.
    /// Returns false for unlinked connections.
    pub fn on_key(&mut self, connection: ConnectionId, input: KeyInput) -> bool {
        let Some(player) = self.players.get_mut(&connection) else {
            return false;
        };
        if input.pressed {
            player.keys.insert(input.direction);
        } else {
            player.keys.remove(&input.direction);
        }
        true
    }

    /// Moves a person's body without simulating the path in between
    pub fn teleport_person(&mut self, id: EntityId, position: Vector2) -> bool {
        let Some(person) = self.persons.get_mut(id) else {
            return false;
        };
        person.position = position;
        self.physics.set_position(person.body, position);
        true
    }

    fn resolve_collision(&mut self, pair: CollisionPair) {
        let (Some(first), Some(second)) = (self.body_kind(pair.a), self.body_kind(pair.b)) else {
            return;
        };

        match (first, second) {
            (BodyKind::Person(person), BodyKind::Coin(coin))
            | (BodyKind::Coin(coin), BodyKind::Person(person)) => {
                self.collect_coin(person, coin);
            }
            (BodyKind::Person(first), BodyKind::Person(second)) => {
                self.swap_roles(first, second);
            }
            _ => {}
        }
    }

    fn collect_coin(&mut self, person: EntityId, coin: EntityId) {
        match self.persons.get(person) {
            Some(collector) if !collector.is_hunter() => {}
            _ => return,
        }

        if self.remove_coin(coin) {
            debug!("Person {} collected coin {}", person, coin);
            if self.coins.is_empty() {
                self.regenerate_coins();
            }
        }
    }

    fn swap_roles(&mut self, first: EntityId, second: EntityId) {
        let (Some(a), Some(b)) = (self.persons.get(first), self.persons.get(second)) else {
            return;
        };
        let (hunter, runner) = match (a.is_hunter(), b.is_hunter()) {
            (true, false) => (first, second),
            (false, true) => (second, first),
            _ => return,
        };

        self.set_role(hunter, Role::Runner);
        self.set_role(runner, Role::Hunter);
        self.teleport_person(runner, self.layout.hunter_spawn);
        self.persons.notify_updated([runner, hunter]);

        info!("Person {} tagged by {} and is now hunting", runner, hunter);
    }

    /// Applies a role and the speed that goes with it
    fn set_role(&mut self, id: EntityId, role: Role) {
        let count = self.persons.len();
        if let Some(person) = self.persons.get_mut(id) {
            person.role = role;
            person.speed = match role {
                Role::Hunter => hunter_speed(count),
                Role::Runner => RUNNER_SPEED,
            };
        }
    }

    fn refresh_hunter_speed(&mut self) {
        let speed = hunter_speed(self.persons.len());
        for person in self.persons.iter_mut().filter(|person| person.is_hunter()) {
            person.speed = speed;
        }
    }
}
