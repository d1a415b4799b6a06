//! Server network layer: a TCP listener for the reliable channel, a UDP
//! socket for snapshots, and the actor loop that owns the room
//!
//! Every socket is serviced by its own task. Tasks never touch the room; they
//! forward [`NetworkEvent`]s to the actor loop, which applies them one at a
//! time between simulation ticks.

use crate::arena::{default_options, ArenaLayout};
use crate::client_manager::ClientManager;
use crate::physics::ArcadePhysics;
use crate::room::Room;
use crate::world::World;
use log::{debug, error, info, warn};
use shared::protocol::{decode, encode_frame, read_frame};
use shared::{
    ClientMessage, ConnectionId, Datagram, ServerMessage, DEFAULT_FPS,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Largest datagram the server expects from a client
const MAX_DATAGRAM_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    /// Reliable channel port
    pub tcp_port: u16,
    /// Snapshot channel port
    pub udp_port: u16,
    pub fps: u32,
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            tcp_port: 8080,
            udp_port: 8081,
            fps: DEFAULT_FPS,
            max_clients: 16,
        }
    }
}

/// Messages sent from network tasks to the actor loop
#[derive(Debug)]
pub enum NetworkEvent {
    Accepted {
        stream: TcpStream,
        peer: SocketAddr,
    },
    Message {
        connection: ConnectionId,
        message: ClientMessage,
    },
    Closed {
        connection: ConnectionId,
    },
    Hello {
        connection: ConnectionId,
        addr: SocketAddr,
    },
    Shutdown,
}

/// Stops a running server from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    events: mpsc::UnboundedSender<NetworkEvent>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.events.send(NetworkEvent::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server coordinating networking and the room
pub struct Server {
    listener: Option<TcpListener>,
    socket: Arc<UdpSocket>,
    room: Room<ClientManager>,
    readers: HashMap<ConnectionId, JoinHandle<()>>,

    // Communication channels
    events_tx: mpsc::UnboundedSender<NetworkEvent>,
    events_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    datagram_rx: Option<mpsc::UnboundedReceiver<(Arc<[u8]>, SocketAddr)>>,
}

impl Server {
    /// Binds both channels and builds the classic arena
    pub async fn bind(config: &ServerConfig) -> Result<Self, BoxError> {
        let listener = TcpListener::bind((config.host.as_str(), config.tcp_port)).await?;
        let socket = Arc::new(UdpSocket::bind((config.host.as_str(), config.udp_port)).await?);
        info!(
            "Server listening on {} (reliable) and {} (snapshots)",
            listener.local_addr()?,
            socket.local_addr()?
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (datagram_tx, datagram_rx) = mpsc::unbounded_channel();

        let world = World::new(
            default_options(config.fps),
            ArenaLayout::default(),
            Box::new(ArcadePhysics::new()),
        );
        let room = Room::new(world, ClientManager::new(config.max_clients, datagram_tx));

        Ok(Server {
            listener: Some(listener),
            socket,
            room,
            readers: HashMap::new(),
            events_tx,
            events_rx,
            datagram_rx: Some(datagram_rx),
        })
    }

    /// Addresses of the reliable and the snapshot channel
    pub fn local_addrs(&self) -> Result<(SocketAddr, SocketAddr), BoxError> {
        let tcp = match &self.listener {
            Some(listener) => listener.local_addr()?,
            None => return Err("listener already handed to the accept task".into()),
        };
        Ok((tcp, self.socket.local_addr()?))
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn room(&self) -> &Room<ClientManager> {
        &self.room
    }

    /// Spawns task that accepts reliable connections
    fn spawn_acceptor(&self, listener: TcpListener) -> JoinHandle<()> {
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        if events.send(NetworkEvent::Accepted { stream, peer }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that listens for hello datagrams
    fn spawn_datagram_receiver(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_LEN];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode::<Datagram>(&buffer[..len]) {
                        Ok(Datagram::Hello { connection }) => {
                            if events.send(NetworkEvent::Hello { connection, addr }).is_err() {
                                break;
                            }
                        }
                        Err(_) => warn!("Dropping malformed datagram from {}", addr),
                    },
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that drains the snapshot queue onto the socket
    fn spawn_datagram_sender(
        &self,
        mut datagrams: mpsc::UnboundedReceiver<(Arc<[u8]>, SocketAddr)>,
    ) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some((payload, addr)) = datagrams.recv().await {
                if let Err(e) = socket.send_to(&payload, addr).await {
                    error!("Failed to send snapshot to {}: {}", addr, e);
                }
            }
        })
    }

    /// Spawns task that turns inbound frames into events
    fn spawn_reader(&self, connection: ConnectionId, mut reader: OwnedReadHalf) -> JoinHandle<()> {
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => match decode::<ClientMessage>(&frame) {
                        Ok(message) => {
                            if events
                                .send(NetworkEvent::Message {
                                    connection,
                                    message,
                                })
                                .is_err()
                            {
                                return;
                            }
                        }
                        Err(e) => warn!("Dropping malformed message from {}: {}", connection, e),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Stream of {} failed: {}", connection, e);
                        break;
                    }
                }
            }
            let _ = events.send(NetworkEvent::Closed { connection });
        })
    }

    /// Spawns task that writes queued frames to the stream
    fn spawn_writer(
        connection: ConnectionId,
        mut writer: OwnedWriteHalf,
        mut outbound: mpsc::UnboundedReceiver<Arc<[u8]>>,
    ) {
        tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                if let Err(e) = writer.write_all(&frame).await {
                    debug!("Failed to write to {}: {}", connection, e);
                    return;
                }
            }
            let _ = writer.shutdown().await;
        });
    }

    /// Tells a connection the server is full and closes it
    fn reject(mut stream: TcpStream, peer: SocketAddr) {
        let message = ServerMessage::Rejected {
            reason: "Server full".to_string(),
        };
        tokio::spawn(async move {
            match encode_frame(&message) {
                Ok(frame) => {
                    if let Err(e) = stream.write_all(&frame).await {
                        debug!("Failed to reject {}: {}", peer, e);
                    }
                }
                Err(e) => error!("Failed to encode rejection: {}", e),
            }
            let _ = stream.shutdown().await;
        });
    }

    fn handle_accepted(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to disable Nagle for {}: {}", peer, e);
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let Some(connection) = self.room.transport_mut().add_client(peer, outbound_tx) else {
            warn!("Rejecting {}: server full", peer);
            Self::reject(stream, peer);
            return;
        };

        let (reader, writer) = stream.into_split();
        Self::spawn_writer(connection, writer, outbound_rx);
        let reader = self.spawn_reader(connection, reader);
        self.readers.insert(connection, reader);

        self.room.connect(connection);
    }

    fn handle_closed(&mut self, connection: ConnectionId) {
        self.room.disconnect(connection);
        self.room.transport_mut().remove_client(connection);
        if let Some(reader) = self.readers.remove(&connection) {
            reader.abort();
        }
    }

    /// Applies one event; returns false when the server should stop
    fn handle_event(&mut self, event: NetworkEvent) -> bool {
        match event {
            NetworkEvent::Accepted { stream, peer } => self.handle_accepted(stream, peer),
            NetworkEvent::Message {
                connection,
                message,
            } => {
                let leaving = message == ClientMessage::Leave;
                self.room.handle_message(connection, message);
                if leaving {
                    self.handle_closed(connection);
                }
            }
            NetworkEvent::Closed { connection } => self.handle_closed(connection),
            NetworkEvent::Hello { connection, addr } => {
                if !self.room.transport_mut().bind_datagram_addr(connection, addr) {
                    warn!("Ignoring hello for {} from {}", connection, addr);
                }
            }
            NetworkEvent::Shutdown => return false,
        }
        true
    }

    /// Main server loop: network events and simulation ticks, one at a time
    pub async fn run(&mut self) -> Result<(), BoxError> {
        let listener = self
            .listener
            .take()
            .ok_or("server is already running")?;
        let datagrams = self
            .datagram_rx
            .take()
            .ok_or("server is already running")?;

        let tasks = vec![
            self.spawn_acceptor(listener),
            self.spawn_datagram_receiver(),
            self.spawn_datagram_sender(datagrams),
        ];

        self.room.runner_mut().play();
        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => {
                            if !self.handle_event(event) {
                                info!("Server shutting down");
                                break;
                            }
                        }
                        None => break,
                    }
                },

                delta = self.room.runner_mut().next_tick() => {
                    self.room.tick(delta);
                },
            }
        }

        self.room.runner_mut().pause();
        for task in tasks {
            task.abort();
        }
        for (_, reader) in self.readers.drain() {
            reader.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn ephemeral(max_clients: usize) -> ServerConfig {
        ServerConfig {
            tcp_port: 0,
            udp_port: 0,
            max_clients,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.tcp_port, 8080);
        assert_eq!(config.udp_port, 8081);
        assert_eq!(config.fps, 50);
        assert_eq!(config.max_clients, 16);
    }

    #[tokio::test]
    async fn test_bind_ephemeral_ports() {
        let server = Server::bind(&ephemeral(4)).await.unwrap();
        let (tcp, udp) = server.local_addrs().unwrap();
        assert_ne!(tcp.port(), 0);
        assert_ne!(udp.port(), 0);
        assert!(server.room().world().persons().is_empty());
        assert!(server.room().runner().is_paused());
    }

    #[tokio::test]
    async fn test_full_server_rejects() {
        let mut server = Server::bind(&ephemeral(0)).await.unwrap();
        let (tcp, _) = server.local_addrs().unwrap();
        let handle = server.shutdown_handle();
        let running = tokio::spawn(async move { server.run().await });

        let mut stream = TcpStream::connect(tcp).await.unwrap();
        let frame = timeout(Duration::from_secs(5), read_frame(&mut stream))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let message: ServerMessage = decode(&frame).unwrap();
        assert!(matches!(message, ServerMessage::Rejected { .. }));

        handle.shutdown();
        timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_run_fails() {
        let mut server = Server::bind(&ephemeral(1)).await.unwrap();
        server.shutdown_handle().shutdown();
        server.run().await.unwrap();
        assert!(server.run().await.is_err());
    }
}
