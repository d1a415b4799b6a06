//! Client-side mirror of the server's collections.
//!
//! Reliable patches mutate the mirrored sets immediately. Snapshots are
//! buffered and sampled a few server frames in the past, so remote persons
//! move smoothly between two known positions instead of jumping on every
//! datagram. Fields the snapshot does not carry (role, animation) always come
//! from the mirror.

use crate::interpolation::{SnapshotBuffer, MAX_BUFFERED_SNAPSHOTS};
use log::{debug, info, warn};
use shared::{
    Animation, CoinState, CollectionPatch, ConnectionId, EntityId, Identified, Options, Patch,
    PersonState, Role, ServerMessage, Snapshot, INTERPOLATION_FRAMES,
};
use std::collections::BTreeMap;

/// Clock offset drift tolerated before it is re-measured
const CLOCK_CORRECTION_MS: i64 = 50;

/// Mirrored entities of one collection
#[derive(Debug, Clone)]
pub struct MirrorSet<S> {
    entities: BTreeMap<EntityId, S>,
}

impl<S> Default for MirrorSet<S> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }
}

impl<S: Identified + Clone> MirrorSet<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes, then updates present ids, then adds absent ids
    pub fn apply_patch(&mut self, patch: &CollectionPatch<S>) {
        for id in patch.del.iter().flatten() {
            self.entities.remove(id);
        }
        for state in patch.upd.iter().flatten() {
            if let Some(existing) = self.entities.get_mut(&state.id()) {
                *existing = state.clone();
            }
        }
        for state in patch.add.iter().flatten() {
            self.entities
                .entry(state.id())
                .or_insert_with(|| state.clone());
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&S> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.entities.values()
    }
}

/// A person as it should be drawn this frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPerson {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub role: Role,
    pub animation: Animation,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    pub persons: Vec<RenderPerson>,
    pub coins: Vec<CoinState>,
}

impl RenderState {
    pub fn hunter(&self) -> Option<&RenderPerson> {
        self.persons.iter().find(|person| person.role == Role::Hunter)
    }
}

pub struct Reconciler {
    connection: Option<ConnectionId>,
    options: Option<Options>,
    persons: MirrorSet<PersonState>,
    coins: MirrorSet<CoinState>,
    buffer: SnapshotBuffer,
    delay_ms: u64,
    clock_offset: Option<i64>,
    rejected_snapshots: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            connection: None,
            options: None,
            persons: MirrorSet::new(),
            coins: MirrorSet::new(),
            buffer: SnapshotBuffer::new(MAX_BUFFERED_SNAPSHOTS),
            delay_ms: Self::delay_for(shared::DEFAULT_FPS),
            clock_offset: None,
            rejected_snapshots: 0,
        }
    }

    fn delay_for(fps: u32) -> u64 {
        INTERPOLATION_FRAMES as u64 * 1000 / fps.max(1) as u64
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn options(&self) -> Option<&Options> {
        self.options.as_ref()
    }

    pub fn persons(&self) -> &MirrorSet<PersonState> {
        &self.persons
    }

    pub fn coins(&self) -> &MirrorSet<CoinState> {
        &self.coins
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    /// Render delay behind the newest server time
    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn rejected_snapshots(&self) -> u64 {
        self.rejected_snapshots
    }

    /// Applies a reliable message; returns false if the server turned the
    /// connection away
    pub fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Init {
                connection,
                options,
                patch,
            } => {
                self.apply_init(connection, options, &patch);
                true
            }
            ServerMessage::Patch(patch) => {
                self.apply_patch(&patch);
                true
            }
            ServerMessage::Rejected { reason } => {
                warn!("Server rejected the connection: {}", reason);
                false
            }
        }
    }

    /// Installs the static options and the full state; a repeated init only
    /// adds what is missing
    pub fn apply_init(&mut self, connection: ConnectionId, options: Options, patch: &Patch) {
        if self.connection.is_some() {
            debug!("Ignoring options of a repeated init");
        } else {
            self.delay_ms = Self::delay_for(options.fps);
            info!(
                "Joined as connection {} ({}x{} arena at {} ticks per second)",
                connection, options.width, options.height, options.fps
            );
            self.connection = Some(connection);
            self.options = Some(options);
        }
        self.apply_patch(patch);
    }

    pub fn apply_patch(&mut self, patch: &Patch) {
        if let Some(persons) = &patch.persons {
            self.persons.apply_patch(persons);
        }
        if let Some(coins) = &patch.coins {
            self.coins.apply_patch(coins);
        }
    }

    /// Decodes and buffers a snapshot datagram received at `now_ms`; returns
    /// false if the buffer was discarded
    pub fn push_snapshot(&mut self, bytes: &[u8], now_ms: u64) -> bool {
        let snapshot = match Snapshot::decode(bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.rejected_snapshots += 1;
                debug!("Discarding snapshot: {}", e);
                return false;
            }
        };

        let Some(offset) = clock_offset(now_ms, snapshot.time) else {
            self.rejected_snapshots += 1;
            debug!("Discarding snapshot stamped {}: time out of range", snapshot.time);
            return false;
        };
        match self.clock_offset {
            Some(current)
                if current.saturating_sub(offset).saturating_abs() <= CLOCK_CORRECTION_MS => {}
            _ => self.clock_offset = Some(offset),
        }

        self.buffer.push(snapshot)
    }

    /// Persons and coins to draw at local time `now_ms`
    pub fn render_state(&self, now_ms: u64) -> RenderState {
        let server_time = i64::try_from(now_ms)
            .unwrap_or(i64::MAX)
            .saturating_sub(self.clock_offset.unwrap_or(0))
            .saturating_sub(i64::try_from(self.delay_ms).unwrap_or(i64::MAX));
        let sampled = self.buffer.sample(server_time.max(0) as u64);

        let persons = self
            .persons
            .iter()
            .map(|person| {
                let position = sampled.as_ref().and_then(|positions| positions.get(&person.id));
                RenderPerson {
                    id: person.id,
                    x: position.map_or(person.x as f32, |p| p.x),
                    y: position.map_or(person.y as f32, |p| p.y),
                    role: person.role,
                    animation: person.animation,
                }
            })
            .collect();

        RenderState {
            persons,
            coins: self.coins.iter().cloned().collect(),
        }
    }
}

/// Local minus server clock; `None` when either stamp exceeds `i64`
fn clock_offset(now_ms: u64, server_ms: u64) -> Option<i64> {
    let now = i64::try_from(now_ms).ok()?;
    let server = i64::try_from(server_ms).ok()?;
    now.checked_sub(server)
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}
