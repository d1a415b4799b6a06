use crate::input::{InputManager, InputMode};
use crate::reconciler::{Reconciler, RenderState};
use log::{debug, error, info, warn};
use shared::protocol::{decode, encode_frame, read_frame};
use shared::{now_ms, ClientMessage, ConnectionId, Datagram, ServerMessage};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const INPUT_PERIOD_MS: u64 = 50;
const RENDER_PERIOD_MS: u64 = 16;
const HELLO_PERIOD_MS: u64 = 250;
/// Render frames between two logged summaries
const RENDER_LOG_EVERY: u64 = 120;
const MAX_DATAGRAM_LEN: usize = 64 * 1024;

/// How a client session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The stop future completed and a leave message was sent
    Stopped,
    /// The server closed the reliable stream
    ServerClosed,
    Rejected(String),
}

/// Headless client: mirrors the arena and drives scripted input
pub struct Client {
    writer: OwnedWriteHalf,
    socket: UdpSocket,
    messages: mpsc::UnboundedReceiver<ServerMessage>,
    reader: JoinHandle<()>,

    reconciler: Reconciler,
    input: InputManager,
    connection: Option<ConnectionId>,
    received_snapshot: bool,
    last_render: RenderState,
}

impl Client {
    pub async fn connect(
        server_addr: &str,
        datagram_addr: &str,
        mode: InputMode,
    ) -> Result<Self, BoxError> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let datagram_addr: SocketAddr = lookup_host(datagram_addr)
            .await?
            .next()
            .ok_or("datagram address did not resolve")?;

        let bind_addr = if datagram_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(datagram_addr).await?;
        info!(
            "Connected to {}, snapshots from {} on {}",
            stream.peer_addr()?,
            datagram_addr,
            socket.local_addr()?
        );

        let (reader, writer) = stream.into_split();
        let (messages_tx, messages) = mpsc::unbounded_channel();
        let reader = Self::spawn_reader(reader, messages_tx);

        Ok(Client {
            writer,
            socket,
            messages,
            reader,
            reconciler: Reconciler::new(),
            input: InputManager::new(mode),
            connection: None,
            received_snapshot: false,
            last_render: RenderState::default(),
        })
    }

    /// Spawns task that decodes reliable frames from the server
    fn spawn_reader(
        mut reader: OwnedReadHalf,
        messages: mpsc::UnboundedSender<ServerMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => match decode::<ServerMessage>(&frame) {
                        Ok(message) => {
                            if messages.send(message).is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("Dropping malformed message: {}", e),
                    },
                    Ok(None) => return,
                    Err(e) => {
                        error!("Error reading from server: {}", e);
                        return;
                    }
                }
            }
        })
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// Most recently sampled render state
    pub fn last_render(&self) -> &RenderState {
        &self.last_render
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), BoxError> {
        let frame = encode_frame(message)?;
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    async fn send_hello(&self) -> Result<(), BoxError> {
        if let Some(connection) = self.connection {
            let datagram = bincode::serialize(&Datagram::Hello { connection })?;
            self.socket.send(&datagram).await?;
        }
        Ok(())
    }

    /// Applies a reliable message; returns the session end it causes, if any
    async fn handle_message(&mut self, message: ServerMessage) -> Option<SessionEnd> {
        if let ServerMessage::Rejected { reason } = &message {
            return Some(SessionEnd::Rejected(reason.clone()));
        }
        let joined = matches!(message, ServerMessage::Init { .. }) && self.connection.is_none();

        self.reconciler.handle_message(message);

        if joined {
            self.connection = self.reconciler.connection();
            if let Err(e) = self.send_hello().await {
                error!("Error sending hello: {}", e);
            }
        }
        None
    }

    fn render(&mut self, frame: u64) {
        self.last_render = self.reconciler.render_state(now_ms());
        if frame % RENDER_LOG_EVERY == 0 {
            let hunter = self.last_render.hunter().map(|hunter| hunter.id);
            debug!(
                "Frame {}: {} persons, {} coins, hunter {:?}, {} snapshots buffered",
                frame,
                self.last_render.persons.len(),
                self.last_render.coins.len(),
                hunter,
                self.reconciler.buffer().len()
            );
        }
    }

    /// Runs the session until `stop` completes or the server goes away
    pub async fn run_until<F>(&mut self, stop: F) -> Result<SessionEnd, BoxError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);

        let mut input_interval = interval(Duration::from_millis(INPUT_PERIOD_MS));
        let mut render_interval = interval(Duration::from_millis(RENDER_PERIOD_MS));
        let mut hello_interval = interval(Duration::from_millis(HELLO_PERIOD_MS));
        for timer in [&mut input_interval, &mut render_interval, &mut hello_interval] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        let mut buffer = vec![0u8; MAX_DATAGRAM_LEN];
        let mut frame = 0u64;

        let end = loop {
            tokio::select! {
                message = self.messages.recv() => {
                    match message {
                        Some(message) => {
                            if let Some(end) = self.handle_message(message).await {
                                break end;
                            }
                        }
                        None => break SessionEnd::ServerClosed,
                    }
                },

                result = self.socket.recv(&mut buffer) => {
                    match result {
                        Ok(len) => {
                            if self.reconciler.push_snapshot(&buffer[..len], now_ms()) {
                                self.received_snapshot = true;
                            }
                        }
                        Err(e) => debug!("Error receiving snapshot: {}", e),
                    }
                },

                _ = hello_interval.tick() => {
                    if !self.received_snapshot {
                        if let Err(e) = self.send_hello().await {
                            error!("Error sending hello: {}", e);
                        }
                    }
                },

                _ = input_interval.tick() => {
                    if self.connection.is_some() {
                        for message in self.input.update(INPUT_PERIOD_MS) {
                            self.send(&message).await?;
                        }
                    }
                },

                _ = render_interval.tick() => {
                    frame += 1;
                    self.render(frame);
                },

                _ = &mut stop => break SessionEnd::Stopped,
            }
        };

        match &end {
            SessionEnd::Stopped => {
                for message in self.input.release_all() {
                    let _ = self.send(&message).await;
                }
                if let Err(e) = self.send(&ClientMessage::Leave).await {
                    debug!("Error sending leave: {}", e);
                }
                let _ = self.writer.shutdown().await;
                info!("Left the arena");
            }
            SessionEnd::ServerClosed => warn!("Server closed the connection"),
            SessionEnd::Rejected(reason) => warn!("Rejected by server: {}", reason),
        }
        Ok(end)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Animation, CollectionPatch, EntityId, Options, Patch, PersonState, Role, Snapshot};
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};
    use tokio_test::assert_ok;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn options() -> Options {
        Options {
            fps: 50,
            width: 800,
            height: 600,
            sprites: Vec::new(),
            map: shared::MapOptions {
                tileset: shared::Tileset {
                    tile_width: 16,
                    tile_height: 16,
                    image: shared::TilesetImage {
                        url: "/images/tileset.png".to_string(),
                        width: 128,
                        height: 128,
                    },
                },
                width: 50,
                height: 38,
                layers: Vec::new(),
            },
        }
    }

    fn runner() -> PersonState {
        PersonState {
            id: EntityId::parse("runner").unwrap(),
            x: 36,
            y: 300,
            role: Role::Runner,
            animation: Animation::Stay,
        }
    }

    async fn fake_server() -> (TcpListener, UdpSocket, String, String) {
        let listener = assert_ok!(TcpListener::bind("127.0.0.1:0").await);
        let socket = assert_ok!(UdpSocket::bind("127.0.0.1:0").await);
        let tcp = listener.local_addr().unwrap().to_string();
        let udp = socket.local_addr().unwrap().to_string();
        (listener, socket, tcp, udp)
    }

    #[tokio::test]
    async fn test_rejection_ends_session() {
        let (listener, _socket, tcp, udp) = fake_server().await;
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let frame = encode_frame(&ServerMessage::Rejected {
                reason: "Server full".to_string(),
            })
            .unwrap();
            stream.write_all(&frame).await.unwrap();
            stream
        });

        let mut client = assert_ok!(Client::connect(&tcp, &udp, InputMode::Idle).await);
        let end = timeout(TEST_TIMEOUT, client.run_until(std::future::pending()))
            .await
            .expect("session timed out");
        assert_eq!(
            assert_ok!(end),
            SessionEnd::Rejected("Server full".to_string())
        );
        assert!(client.connection().is_none());
        let _stream = server.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_joins_greets_and_leaves() {
        let (listener, socket, tcp, udp) = fake_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let init = ServerMessage::Init {
                connection: ConnectionId(7),
                options: options(),
                patch: Patch::persons(CollectionPatch::added(vec![runner()])),
            };
            writer.write_all(&encode_frame(&init).unwrap()).await.unwrap();

            let mut buffer = [0u8; 64];
            let (len, from) = socket.recv_from(&mut buffer).await.unwrap();
            let hello: Datagram = bincode::deserialize(&buffer[..len]).unwrap();
            assert_eq!(
                hello,
                Datagram::Hello {
                    connection: ConnectionId(7)
                }
            );

            let snapshot = Snapshot::new(EntityId::parse("snap01").unwrap(), now_ms(), &[runner()]);
            socket.send_to(&snapshot.encode().unwrap(), from).await.unwrap();

            let mut received = Vec::new();
            while let Some(frame) = read_frame(&mut reader).await.unwrap() {
                received.push(decode::<ClientMessage>(&frame).unwrap());
            }
            received
        });

        let mut client = assert_ok!(Client::connect(&tcp, &udp, InputMode::Idle).await);
        let end = timeout(TEST_TIMEOUT, client.run_until(sleep(Duration::from_millis(500))))
            .await
            .expect("session timed out");
        assert_eq!(assert_ok!(end), SessionEnd::Stopped);

        assert_eq!(client.connection(), Some(ConnectionId(7)));
        assert_eq!(client.reconciler().persons().len(), 1);
        assert_eq!(client.reconciler().buffer().len(), 1);
        assert_eq!(client.last_render().persons.len(), 1);

        let received = timeout(TEST_TIMEOUT, server)
            .await
            .expect("server timed out")
            .unwrap();
        assert_eq!(received, vec![ClientMessage::Leave]);
    }
}
