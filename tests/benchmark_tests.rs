//! Performance benchmarks for the per-tick hot paths

use client::interpolation::SnapshotBuffer;
use client::reconciler::Reconciler;
use server::arena::{default_options, ArenaLayout};
use server::physics::ArcadePhysics;
use server::world::World;
use shared::{
    Animation, ClientMessage, ConnectionId, Direction, EntityId, KeyInput, PersonState, Role,
    Snapshot,
};
use std::time::Instant;

fn persons(count: usize) -> Vec<PersonState> {
    (0..count)
        .map(|i| PersonState {
            id: EntityId::parse(&format!("p{:05}", i)).unwrap(),
            x: (i * 13 % 800) as i64,
            y: (i * 7 % 600) as i64,
            role: if i == 0 { Role::Hunter } else { Role::Runner },
            animation: Animation::MoveRight,
        })
        .collect()
}

fn populated_world(players: u32) -> World {
    let mut world = World::new(
        default_options(50),
        ArenaLayout::default(),
        Box::new(ArcadePhysics::new()),
    );
    for i in 0..players {
        let spawn = world.spawn_point_for_next_person();
        let person = world.create_person(spawn);
        let connection = ConnectionId(i + 1);
        world.link_player(connection, person);
        let direction = Direction::ALL[i as usize % Direction::ALL.len()];
        world.on_key(
            connection,
            KeyInput {
                direction,
                pressed: true,
            },
        );
    }
    world
}

/// Benchmarks snapshot encoding for a busy arena
#[test]
fn benchmark_snapshot_encode() {
    let snapshot = Snapshot::new(EntityId::parse("snap01").unwrap(), 1_000, &persons(32));

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = snapshot.encode().unwrap();
        assert_eq!(bytes.len(), Snapshot::encoded_len(32));
    }

    let duration = start.elapsed();
    println!(
        "Snapshot encode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds even in debug builds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks snapshot decoding, which every client does once per tick
#[test]
fn benchmark_snapshot_decode() {
    let bytes = Snapshot::new(EntityId::parse("snap01").unwrap(), 1_000, &persons(32))
        .encode()
        .unwrap();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let snapshot = Snapshot::decode(&bytes).unwrap();
        assert_eq!(snapshot.state.persons.len(), 32);
    }

    let duration = start.elapsed();
    println!(
        "Snapshot decode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks world simulation with many moving players
#[test]
fn benchmark_world_update() {
    let mut world = populated_world(16);

    let ticks = 1_000;
    let start = Instant::now();

    for _ in 0..ticks {
        world.update(20.0);
    }

    let duration = start.elapsed();
    println!(
        "World update: {} ticks with {} players in {:?} ({:.2} μs/tick)",
        ticks,
        world.persons().len(),
        duration,
        duration.as_micros() as f64 / ticks as f64
    );

    assert_eq!(world.persons().len(), 16);
    assert!(world.hunter().is_some());
    // 1000 ticks is 20 seconds of game time; simulating must be far faster
    assert!(duration.as_secs() < 5);
}

/// Benchmarks interpolation sampling over a full snapshot buffer
#[test]
fn benchmark_interpolation_sampling() {
    let mut buffer = SnapshotBuffer::default();
    let roster = persons(16);
    for tick in 0..120u64 {
        let id = EntityId::parse(&format!("s{:05}", tick)).unwrap();
        buffer.push(Snapshot::new(id, 1_000 + tick * 20, &roster));
    }
    assert_eq!(buffer.len(), 120);

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let time = 1_000 + (i as u64 * 7) % 2_400;
        let sampled = buffer.sample(time).unwrap();
        assert_eq!(sampled.len(), 16);
    }

    let duration = start.elapsed();
    println!(
        "Interpolation sampling: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

/// Benchmarks the full client path: patch handling, snapshot intake, rendering
#[test]
fn benchmark_reconciler_pipeline() {
    let roster = persons(16);
    let snapshots: Vec<Vec<u8>> = (0..500u64)
        .map(|tick| {
            let id = EntityId::parse(&format!("r{:05}", tick)).unwrap();
            Snapshot::new(id, 10_000 + tick * 20, &roster)
                .encode()
                .unwrap()
        })
        .collect();

    let mut reconciler = Reconciler::new();
    reconciler.apply_patch(&shared::Patch::persons(shared::CollectionPatch::added(
        roster.clone(),
    )));

    let start = Instant::now();
    for (tick, bytes) in snapshots.iter().enumerate() {
        let now = 10_000 + tick as u64 * 20;
        assert!(reconciler.push_snapshot(bytes, now));
        let state = reconciler.render_state(now);
        assert_eq!(state.persons.len(), 16);
    }
    let duration = start.elapsed();

    println!(
        "Reconciler pipeline: {} snapshots in {:?}",
        snapshots.len(),
        duration
    );
    assert!(duration.as_secs() < 5);

    // Input messages stay tiny on the wire
    let key = ClientMessage::Key(KeyInput {
        direction: Direction::W,
        pressed: true,
    });
    assert!(shared::protocol::encode_frame(&key).unwrap().len() < 16);
}
