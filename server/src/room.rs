//! Bridge between the world and the network boundary.
//!
//! The room owns the [`World`] and its [`Runner`], turns registry events into
//! reliable patch messages, answers joins with an `init` message and
//! broadcasts one binary snapshot per tick. Delivery itself is delegated to a
//! [`Transport`], so the room can be driven without sockets.

use crate::entity::generate_id;
use crate::physics::Vector2;
use crate::registry::{RegistryEvent, Subscription};
use crate::runner::Runner;
use crate::world::World;
use log::{debug, error, info, warn};
use shared::{
    now_ms, ClientMessage, CoinState, CollectionPatch, ConnectionId, EntityId, Patch,
    PersonState, ServerMessage, Snapshot,
};

/// How often tick statistics are logged
const STATS_EVERY_TICKS: u64 = 250;

/// Delivery primitives the room needs from the network layer
pub trait Transport {
    /// Reliable message to one connection
    fn send(&mut self, connection: ConnectionId, message: &ServerMessage);

    /// Reliable message to every connection except `exclude`
    fn broadcast(&mut self, message: &ServerMessage, exclude: Option<ConnectionId>);

    /// Unreliable raw bytes to every connection with a bound datagram address
    fn broadcast_raw(&mut self, bytes: &[u8]);
}

/// One arena session: a world, its tick schedule and the clients watching it
///
/// Every mutation that goes through the room is followed by a patch flush,
/// so the transport always sees changes in the order the world made them.
/// The room never touches sockets itself.
pub struct Room<T: Transport> {
    world: World,
    runner: Runner,
    transport: T,
    persons_feed: Subscription<PersonState>,
    coins_feed: Subscription<CoinState>,
}

impl<T: Transport> Room<T> {
    /// Wires the world's collections to the transport; the runner starts paused
    pub fn new(mut world: World, transport: T) -> Self {
        let runner = Runner::new(world.options().fps);
        let persons_feed = world.persons_mut().subscribe();
        let coins_feed = world.coins_mut().subscribe();
        Self {
            world,
            runner,
            transport,
            persons_feed,
            coins_feed,
        }
    }

    /// The simulated arena
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access
    ///
    /// Registry changes made here are queued and reach clients on the next
    /// [`Room::flush_patches`] or [`Room::tick`].
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Used by the server loop to start and pause ticking
    pub fn runner_mut(&mut self) -> &mut Runner {
        &mut self.runner
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The delivery layer, for registering and dropping connections
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Spawns and links a person for the connection
    ///
    /// Pending changes are flushed first. The newcomer then receives an
    /// `init` message that already contains its own person, and only the
    /// other connections receive the matching `add` patch. Returns the id
    /// of the new person.
    pub fn connect(&mut self, connection: ConnectionId) -> EntityId {
        // Anything pending predates the newcomer's init
        self.flush_patches(None);

        let spawn: Vector2 = self.world.spawn_point_for_next_person();
        let person = self.world.create_person(spawn);
        self.world.link_player(connection, person);

        let init = self.init_message(connection);
        self.transport.send(connection, &init);
        self.flush_patches(Some(connection));

        info!("Connection {} controls person {}", connection, person);
        person
    }

    /// Unlinks the connection and removes its person
    ///
    /// The removal, and any hunter promotion it causes, is broadcast
    /// immediately. Returns `None` when the connection had no person, which
    /// makes repeated calls harmless.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<EntityId> {
        let person = self.world.unlink_player(connection)?;
        self.world.remove_person(person);
        self.flush_patches(None);
        info!("Connection {} released person {}", connection, person);
        Some(person)
    }

    /// Applies one reliable message from a client
    ///
    /// Key input from a connection without a person is logged and dropped.
    /// `Leave` behaves exactly like [`Room::disconnect`].
    pub fn handle_message(&mut self, connection: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Key(input) => {
                if !self.world.on_key(connection, input) {
                    warn!("Key input from unlinked connection {}", connection);
                }
            }
            ClientMessage::Leave => {
                self.disconnect(connection);
            }
        }
    }

    /// One simulation step followed by patch delivery and a snapshot
    ///
    /// Patches produced by the step are sent before the snapshot, so a
    /// client never samples a person it has not been told about yet.
    pub fn tick(&mut self, delta_ms: f32) {
        self.world.update(delta_ms);
        self.flush_patches(None);

        let snapshot = self.snapshot();
        match snapshot.encode() {
            Ok(bytes) => self.transport.broadcast_raw(&bytes),
            Err(e) => error!("Failed to encode snapshot: {}", e),
        }

        let ticks = self.runner.ticks();
        if ticks > 0 && ticks % STATS_EVERY_TICKS == 0 {
            debug!(
                "Tick {}: {} persons, {} coins, {} players",
                ticks,
                self.world.persons().len(),
                self.world.coins().len(),
                self.world.player_count()
            );
        }
    }

    /// Static options plus every mirrored collection expressed as additions
    pub fn init_message(&self, connection: ConnectionId) -> ServerMessage {
        ServerMessage::Init {
            connection,
            options: self.world.options().clone(),
            patch: Patch {
                persons: Some(CollectionPatch::added(self.world.persons().state())),
                coins: Some(CollectionPatch::added(self.world.coins().state())),
            },
        }
    }

    /// Current persons under a fresh snapshot id
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(generate_id(), now_ms(), &self.world.persons().state())
    }

    /// Broadcasts one patch message per pending registry event
    pub fn flush_patches(&mut self, exclude: Option<ConnectionId>) {
        let mut patches = Vec::new();
        for event in self.persons_feed.drain() {
            patches.push(Patch::persons(collection_patch(event)));
        }
        for event in self.coins_feed.drain() {
            patches.push(Patch::coins(collection_patch(event)));
        }

        for patch in patches {
            if patch.is_empty() {
                continue;
            }
            self.transport
                .broadcast(&ServerMessage::Patch(patch), exclude);
        }
    }
}

fn collection_patch<S>(event: RegistryEvent<S>) -> CollectionPatch<S> {
    match event {
        RegistryEvent::Added(states) => CollectionPatch::added(states),
        RegistryEvent::Updated(states) => CollectionPatch::updated(states),
        RegistryEvent::Deleted(ids) => CollectionPatch::deleted(ids),
    }
}
