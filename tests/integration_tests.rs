//! Integration tests for the tag arena
//!
//! The in-process tests drive a `Room` through a fan-out transport into one
//! `Reconciler` per connection. The loopback tests run the real server and
//! headless clients over TCP and UDP on ephemeral ports.

use client::reconciler::Reconciler;
use server::arena::{default_options, ArenaLayout};
use server::physics::{ArcadePhysics, Vector2};
use server::room::{Room, Transport};
use server::world::World;
use shared::{
    Animation, ClientMessage, ConnectionId, Direction, EntityId, KeyInput, Role, ServerMessage,
    Snapshot,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// Delivers every message to the reconcilers of the addressed connections
#[derive(Default)]
struct Hub {
    clients: BTreeMap<ConnectionId, Reconciler>,
    snapshots: Vec<Vec<u8>>,
}

impl Hub {
    fn join(&mut self, connection: ConnectionId) {
        self.clients.insert(connection, Reconciler::new());
    }

    fn client(&self, connection: ConnectionId) -> &Reconciler {
        &self.clients[&connection]
    }
}

impl Transport for Hub {
    fn send(&mut self, connection: ConnectionId, message: &ServerMessage) {
        if let Some(reconciler) = self.clients.get_mut(&connection) {
            reconciler.handle_message(message.clone());
        }
    }

    fn broadcast(&mut self, message: &ServerMessage, exclude: Option<ConnectionId>) {
        for (connection, reconciler) in self.clients.iter_mut() {
            if Some(*connection) != exclude {
                reconciler.handle_message(message.clone());
            }
        }
    }

    fn broadcast_raw(&mut self, bytes: &[u8]) {
        self.snapshots.push(bytes.to_vec());
    }
}

fn room() -> Room<Hub> {
    let layout = ArenaLayout {
        coins: vec![Vector2::new(300.0, 60.0), Vector2::new(300.0, 540.0)],
        walls: Vec::new(),
        victim_spawn: Vector2::new(100.0, 300.0),
        hunter_spawn: Vector2::new(700.0, 300.0),
    };
    let world = World::new(default_options(50), layout, Box::new(ArcadePhysics::new()));
    Room::new(world, Hub::default())
}

fn join(room: &mut Room<Hub>, connection: ConnectionId) -> EntityId {
    room.transport_mut().join(connection);
    room.connect(connection)
}

fn leave(room: &mut Room<Hub>, connection: ConnectionId) {
    room.handle_message(connection, ClientMessage::Leave);
    room.transport_mut().clients.remove(&connection);
}

fn press(room: &mut Room<Hub>, connection: ConnectionId, direction: Direction) {
    room.handle_message(
        connection,
        ClientMessage::Key(KeyInput {
            direction,
            pressed: true,
        }),
    );
}

/// MIRROR CONSISTENCY TESTS
mod mirror_tests {
    use super::*;

    #[test]
    fn every_client_mirrors_the_same_persons() {
        let mut room = room();
        let first = join(&mut room, ConnectionId(1));
        let second = join(&mut room, ConnectionId(2));
        let third = join(&mut room, ConnectionId(3));

        for connection in [ConnectionId(1), ConnectionId(2), ConnectionId(3)] {
            let mirror = room.transport().client(connection);
            assert_eq!(mirror.connection(), Some(connection));
            assert_eq!(mirror.persons().len(), 3);
            assert_eq!(mirror.coins().len(), 2);

            assert_eq!(mirror.persons().get(first).unwrap().role, Role::Runner);
            assert_eq!(mirror.persons().get(second).unwrap().role, Role::Hunter);
            assert_eq!(mirror.persons().get(third).unwrap().role, Role::Runner);
        }
    }

    #[test]
    fn promotion_reaches_every_remaining_client() {
        let mut room = room();
        let first = join(&mut room, ConnectionId(1));
        let hunter = join(&mut room, ConnectionId(2));
        join(&mut room, ConnectionId(3));

        leave(&mut room, ConnectionId(2));

        assert_eq!(room.world().hunter(), Some(first));
        for connection in [ConnectionId(1), ConnectionId(3)] {
            let mirror = room.transport().client(connection);
            assert_eq!(mirror.persons().len(), 2);
            assert!(!mirror.persons().contains(hunter));
            assert_eq!(mirror.persons().get(first).unwrap().role, Role::Hunter);
        }
    }

    #[test]
    fn late_joiner_receives_collected_coin_state() {
        let mut room = room();
        let runner = join(&mut room, ConnectionId(1));
        let coin = room.world().coins().ids()[0];
        room.world_mut()
            .teleport_person(runner, Vector2::new(300.0, 60.0));
        room.tick(20.0);

        assert!(!room.world().coins().contains(coin));
        assert!(!room.transport().client(ConnectionId(1)).coins().contains(coin));

        join(&mut room, ConnectionId(2));
        let late = room.transport().client(ConnectionId(2));
        assert_eq!(late.coins().len(), 1);
        assert!(!late.coins().contains(coin));
    }
}

/// SNAPSHOT AND INTERPOLATION TESTS
mod snapshot_tests {
    use super::*;

    #[test]
    fn rendered_position_follows_the_simulation() {
        let mut room = room();
        let runner = join(&mut room, ConnectionId(1));
        join(&mut room, ConnectionId(2));
        press(&mut room, ConnectionId(1), Direction::S);

        for _ in 0..10 {
            // Distinct millisecond timestamps per snapshot
            std::thread::sleep(Duration::from_millis(2));
            room.tick(20.0);
        }

        let snapshots = std::mem::take(&mut room.transport_mut().snapshots);
        assert_eq!(snapshots.len(), 10);

        let observer = room.transport_mut().clients.get_mut(&ConnectionId(2)).unwrap();
        let mut latest_time = 0;
        for bytes in &snapshots {
            let time = Snapshot::decode(bytes).unwrap().time;
            assert!(observer.push_snapshot(bytes, time));
            latest_time = time;
        }

        let state = observer.render_state(latest_time + observer.delay_ms());
        let rendered = state.persons.iter().find(|person| person.id == runner).unwrap();
        let simulated = room.world().persons().get(runner).unwrap().position;

        assert_eq!(rendered.x, simulated.x.trunc());
        assert_eq!(rendered.y, simulated.y.trunc());
        assert_eq!(rendered.y, 320.0);
        assert_eq!(rendered.animation, Animation::MoveDown);
        assert_eq!(rendered.role, Role::Runner);
    }

    #[test]
    fn snapshot_carries_every_person() {
        let mut room = room();
        join(&mut room, ConnectionId(1));
        join(&mut room, ConnectionId(2));
        room.tick(20.0);

        let bytes = room.transport().snapshots.last().unwrap();
        let snapshot = Snapshot::decode(bytes).unwrap();
        assert_eq!(snapshot.state.persons.len(), 2);
        assert_eq!(bytes.len(), Snapshot::encoded_len(2));
    }
}

/// LOOPBACK NETWORK TESTS
mod network_tests {
    use super::*;
    use client::input::InputMode;
    use client::network::{Client, SessionEnd};
    use server::network::{Server, ServerConfig};
    use tokio::time::{sleep, sleep_until, timeout, Instant};

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn config(max_clients: usize) -> ServerConfig {
        ServerConfig {
            tcp_port: 0,
            udp_port: 0,
            max_clients,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn clients_join_mirror_and_leave() {
        let mut server = Server::bind(&config(4)).await.unwrap();
        let (tcp, udp) = server.local_addrs().unwrap();
        let (tcp, udp) = (tcp.to_string(), udp.to_string());
        let shutdown = server.shutdown_handle();
        let running = tokio::spawn(async move {
            let result = server.run().await;
            (server, result.map_err(|e| e.to_string()))
        });

        let mut first = Client::connect(&tcp, &udp, InputMode::Idle).await.unwrap();
        let mut second = Client::connect(&tcp, &udp, InputMode::Idle).await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(800);
        let (first_end, second_end) = timeout(
            TEST_TIMEOUT,
            async {
                tokio::join!(
                    first.run_until(sleep_until(deadline)),
                    second.run_until(sleep_until(deadline))
                )
            },
        )
        .await
        .expect("sessions timed out");
        assert_eq!(first_end.unwrap(), SessionEnd::Stopped);
        assert_eq!(second_end.unwrap(), SessionEnd::Stopped);

        assert!(first.connection().is_some());
        assert!(second.connection().is_some());
        assert_ne!(first.connection(), second.connection());

        let expected_coins = ArenaLayout::default().coins.len();
        for client in [&first, &second] {
            let mirror = client.reconciler();
            assert_eq!(mirror.persons().len(), 2);
            assert_eq!(mirror.coins().len(), expected_coins);
            assert_eq!(
                mirror
                    .persons()
                    .iter()
                    .filter(|person| person.role == Role::Hunter)
                    .count(),
                1
            );
            assert!(!mirror.buffer().is_empty());
        }

        // Give the server time to process both leave messages
        sleep(Duration::from_millis(200)).await;
        shutdown.shutdown();
        let (server, result) = timeout(TEST_TIMEOUT, running)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert!(server.room().world().persons().is_empty());
        assert!(server.room().transport().is_empty());
    }

    #[tokio::test]
    async fn full_server_rejects_client() {
        let mut server = Server::bind(&config(1)).await.unwrap();
        let (tcp, udp) = server.local_addrs().unwrap();
        let (tcp, udp) = (tcp.to_string(), udp.to_string());
        let shutdown = server.shutdown_handle();
        let running = tokio::spawn(async move { server.run().await.map_err(|e| e.to_string()) });

        let mut admitted = Client::connect(&tcp, &udp, InputMode::Idle).await.unwrap();
        let mut rejected = Client::connect(&tcp, &udp, InputMode::Idle).await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(500);
        let (admitted_end, rejected_end) = timeout(
            TEST_TIMEOUT,
            async {
                tokio::join!(
                    admitted.run_until(sleep_until(deadline)),
                    rejected.run_until(std::future::pending())
                )
            },
        )
        .await
        .expect("sessions timed out");

        assert_eq!(admitted_end.unwrap(), SessionEnd::Stopped);
        assert_eq!(
            rejected_end.unwrap(),
            SessionEnd::Rejected("Server full".to_string())
        );
        assert!(admitted.connection().is_some());
        assert!(rejected.connection().is_none());

        shutdown.shutdown();
        assert!(timeout(TEST_TIMEOUT, running).await.unwrap().unwrap().is_ok());
    }
}
