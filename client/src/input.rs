//! Scripted input for the headless client with key edge detection

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{ClientMessage, Direction, KeyInput};
use std::collections::BTreeSet;

/// How the client decides which keys to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Never presses anything
    Idle,
    /// Picks a new random set of held keys every `period_ms`
    Wander { period_ms: u64 },
}

/// Turns the keys a script wants held into press/release messages
pub struct InputManager {
    mode: InputMode,
    rng: StdRng,
    held: BTreeSet<Direction>,
    /// Time since the last pick, `None` before the first one
    since_pick: Option<u64>,
}

impl InputManager {
    pub fn new(mode: InputMode) -> Self {
        Self::with_rng(mode, StdRng::from_entropy())
    }

    pub fn with_rng(mode: InputMode, rng: StdRng) -> Self {
        Self {
            mode,
            rng,
            held: BTreeSet::new(),
            since_pick: None,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn held(&self) -> impl Iterator<Item = Direction> + '_ {
        self.held.iter().copied()
    }

    /// Advances the script and returns the key transitions to send
    pub fn update(&mut self, delta_ms: u64) -> Vec<ClientMessage> {
        let InputMode::Wander { period_ms } = self.mode else {
            return Vec::new();
        };

        if let Some(since) = self.since_pick {
            let since = since + delta_ms;
            if since < period_ms {
                self.since_pick = Some(since);
                return Vec::new();
            }
        }
        self.since_pick = Some(0);

        let wanted = self.pick_keys();
        self.hold(wanted)
    }

    /// Releases everything currently held
    pub fn release_all(&mut self) -> Vec<ClientMessage> {
        self.hold(BTreeSet::new())
    }

    /// Replaces the held set, emitting releases before presses
    pub fn hold(&mut self, wanted: BTreeSet<Direction>) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        for direction in self.held.difference(&wanted) {
            messages.push(ClientMessage::Key(KeyInput {
                direction: *direction,
                pressed: false,
            }));
        }
        for direction in wanted.difference(&self.held) {
            messages.push(ClientMessage::Key(KeyInput {
                direction: *direction,
                pressed: true,
            }));
        }
        self.held = wanted;
        messages
    }

    /// Nothing, one direction, or one vertical plus one horizontal direction
    fn pick_keys(&mut self) -> BTreeSet<Direction> {
        let mut keys = BTreeSet::new();
        let vertical = [None, Some(Direction::W), Some(Direction::S)];
        let horizontal = [None, Some(Direction::A), Some(Direction::D)];
        if let Some(direction) = vertical[self.rng.gen_range(0..vertical.len())] {
            keys.insert(direction);
        }
        if let Some(direction) = horizontal[self.rng.gen_range(0..horizontal.len())] {
            keys.insert(direction);
        }
        keys
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(InputMode::Idle)
    }
}
