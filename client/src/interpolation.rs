//! Time-ordered buffer of decoded snapshots and linear position sampling

use shared::{EntityId, Snapshot};
use std::collections::{HashMap, VecDeque};

/// Snapshots kept before the oldest is dropped
pub const MAX_BUFFERED_SNAPSHOTS: usize = 120;

/// Interpolated position of one person
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledPosition {
    pub x: f32,
    pub y: f32,
}

pub struct SnapshotBuffer {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Inserts in time order; returns false for a snapshot whose time or id
    /// is already buffered
    pub fn push(&mut self, snapshot: Snapshot) -> bool {
        if self
            .snapshots
            .iter()
            .any(|existing| existing.time == snapshot.time || existing.id == snapshot.id)
        {
            return false;
        }

        let index = self
            .snapshots
            .partition_point(|existing| existing.time < snapshot.time);
        self.snapshots.insert(index, snapshot);

        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Positions at `time`, interpolated between the two bracketing
    /// snapshots. Clamps to the oldest or latest snapshot outside the
    /// buffered window; `None` while the buffer is empty.
    pub fn sample(&self, time: u64) -> Option<HashMap<EntityId, SampledPosition>> {
        let oldest = self.oldest()?;
        let latest = self.latest()?;

        if time <= oldest.time {
            return Some(positions(oldest));
        }
        if time >= latest.time {
            return Some(positions(latest));
        }

        let after = self.snapshots.partition_point(|snapshot| snapshot.time <= time);
        let older = &self.snapshots[after - 1];
        let newer = &self.snapshots[after];
        let alpha = (time - older.time) as f32 / (newer.time - older.time) as f32;

        let from = positions(older);
        let sampled = newer
            .state
            .persons
            .iter()
            .map(|record| {
                let to = SampledPosition {
                    x: record.x as f32,
                    y: record.y as f32,
                };
                let position = match from.get(&record.id) {
                    Some(start) => SampledPosition {
                        x: start.x + (to.x - start.x) * alpha,
                        y: start.y + (to.y - start.y) * alpha,
                    },
                    None => to,
                };
                (record.id, position)
            })
            .collect();
        Some(sampled)
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new(MAX_BUFFERED_SNAPSHOTS)
    }
}

fn positions(snapshot: &Snapshot) -> HashMap<EntityId, SampledPosition> {
    snapshot
        .state
        .persons
        .iter()
        .map(|record| {
            (
                record.id,
                SampledPosition {
                    x: record.x as f32,
                    y: record.y as f32,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Animation, PersonState, Role};

    fn id(text: &str) -> EntityId {
        EntityId::parse(text).unwrap()
    }

    fn person(name: &str, x: i64, y: i64) -> PersonState {
        PersonState {
            id: id(name),
            x,
            y,
            role: Role::Runner,
            animation: Animation::Stay,
        }
    }

    fn snapshot(name: &str, time: u64, persons: &[PersonState]) -> Snapshot {
        Snapshot::new(id(name), time, persons)
    }

    #[test]
    fn test_push_orders_and_drops_duplicates() {
        let mut buffer = SnapshotBuffer::default();
        assert!(buffer.push(snapshot("snap02", 1020, &[])));
        assert!(buffer.push(snapshot("snap01", 1000, &[])));
        assert!(!buffer.push(snapshot("snap03", 1020, &[])));
        assert!(!buffer.push(snapshot("snap01", 1040, &[])));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.oldest().unwrap().time, 1000);
        assert_eq!(buffer.latest().unwrap().time, 1020);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut buffer = SnapshotBuffer::new(3);
        for (i, name) in ["aaaaaa", "bbbbbb", "cccccc", "dddddd"].iter().enumerate() {
            buffer.push(snapshot(name, 1000 + i as u64 * 20, &[]));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest().unwrap().time, 1020);
    }

    #[test]
    fn test_sample_interpolates_between_brackets() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(snapshot("snap01", 1000, &[person("runner", 0, 100)]));
        buffer.push(snapshot("snap02", 1020, &[person("runner", 20, 60)]));

        let sampled = buffer.sample(1005).unwrap();
        let position = sampled[&id("runner")];
        assert_approx_eq!(position.x, 5.0, 1e-4);
        assert_approx_eq!(position.y, 90.0, 1e-4);
    }

    #[test]
    fn test_sample_clamps_outside_window() {
        let mut buffer = SnapshotBuffer::default();
        assert!(buffer.sample(1000).is_none());

        buffer.push(snapshot("snap01", 1000, &[person("runner", 0, 0)]));
        buffer.push(snapshot("snap02", 1020, &[person("runner", 20, 0)]));

        assert_eq!(buffer.sample(10).unwrap()[&id("runner")].x, 0.0);
        assert_eq!(buffer.sample(5000).unwrap()[&id("runner")].x, 20.0);
    }

    #[test]
    fn test_newcomer_takes_newer_position() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(snapshot("snap01", 1000, &[person("runner", 0, 0)]));
        buffer.push(snapshot(
            "snap02",
            1020,
            &[person("runner", 20, 0), person("hunter", 300, 300)],
        ));

        let sampled = buffer.sample(1010).unwrap();
        assert_eq!(sampled.len(), 2);
        assert_eq!(sampled[&id("hunter")], SampledPosition { x: 300.0, y: 300.0 });
    }
}
