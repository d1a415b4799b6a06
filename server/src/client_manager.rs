//! Connection bookkeeping for the multiplayer server
//!
//! This module tracks every accepted connection, including:
//! - Connection lifecycle (accept, reject at capacity, disconnect)
//! - The outbound queue of each connection's reliable stream
//! - The datagram address each connection bound with a hello
//!
//! The client manager is also the room's [`Transport`]: reliable messages are
//! framed once and queued on the per-connection writer tasks, snapshots are
//! queued once per bound datagram address on the shared datagram sender.

use crate::room::Transport;
use log::{debug, error, info, warn};
use shared::{protocol::encode_frame, ConnectionId, ServerMessage};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Framed bytes queued for one connection's stream writer
pub type Outbound = mpsc::UnboundedSender<Arc<[u8]>>;

/// Raw datagram payload and its destination
pub type DatagramOut = mpsc::UnboundedSender<(Arc<[u8]>, SocketAddr)>;

/// Represents an accepted connection
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Remote address of the reliable stream
    pub peer: SocketAddr,
    /// Where snapshots go once the client has said hello
    pub datagram_addr: Option<SocketAddr>,
    outbound: Outbound,
}

impl Client {
    pub fn new(id: ConnectionId, peer: SocketAddr, outbound: Outbound) -> Self {
        Self {
            id,
            peer,
            datagram_addr: None,
            outbound,
        }
    }

    /// Queues framed bytes; returns false once the writer has gone away
    fn queue(&self, frame: Arc<[u8]>) -> bool {
        self.outbound.send(frame).is_ok()
    }
}

/// Manages all accepted connections and fans messages out to them
///
/// Enforces the capacity limit, hands out monotonically increasing
/// connection ids starting from 1 and never reuses them.
pub struct ClientManager {
    /// Accepted connections indexed by id
    clients: BTreeMap<ConnectionId, Client>,
    /// Next id handed to an accepted connection
    next_client_id: u32,
    /// Maximum number of concurrent connections
    max_clients: usize,
    /// Shared datagram sender queue
    datagrams: DatagramOut,
}

impl ClientManager {
    pub fn new(max_clients: usize, datagrams: DatagramOut) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
            datagrams,
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Registers a connection, or returns None if the server is full.
    ///
    /// Ids are never reused. Once the id space is exhausted every further
    /// connection is refused as well.
    pub fn add_client(&mut self, peer: SocketAddr, outbound: Outbound) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let id = ConnectionId(self.next_client_id);
        let Some(next) = self.next_client_id.checked_add(1) else {
            warn!("Connection ids exhausted, refusing {}", peer);
            return None;
        };
        self.next_client_id = next;

        info!("Client {} connected from {}", id, peer);
        self.clients.insert(id, Client::new(id, peer, outbound));
        Some(id)
    }

    /// Returns true if the connection was found and removed
    pub fn remove_client(&mut self, id: ConnectionId) -> bool {
        match self.clients.remove(&id) {
            Some(client) => {
                info!("Client {} ({}) disconnected", id, client.peer);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Binds the address a hello came from to its connection
    ///
    /// Returns false for unknown connections or hellos whose source IP does
    /// not match the stream's peer.
    pub fn bind_datagram_addr(&mut self, id: ConnectionId, addr: SocketAddr) -> bool {
        let Some(client) = self.clients.get_mut(&id) else {
            return false;
        };
        if client.peer.ip() != addr.ip() {
            return false;
        }
        if client.datagram_addr != Some(addr) {
            debug!("Client {} receives snapshots at {}", id, addr);
            client.datagram_addr = Some(addr);
        }
        true
    }

    pub fn datagram_addr(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.clients.get(&id).and_then(|client| client.datagram_addr)
    }

    pub fn client_ids(&self) -> Vec<ConnectionId> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn frame(message: &ServerMessage) -> Option<Arc<[u8]>> {
        match encode_frame(message) {
            Ok(bytes) => Some(bytes.into()),
            Err(e) => {
                error!("Failed to encode message: {}", e);
                None
            }
        }
    }
}

impl Transport for ClientManager {
    fn send(&mut self, connection: ConnectionId, message: &ServerMessage) {
        let Some(client) = self.clients.get(&connection) else {
            return;
        };
        if let Some(frame) = Self::frame(message) {
            if !client.queue(frame) {
                debug!("Writer for client {} is gone", connection);
            }
        }
    }

    fn broadcast(&mut self, message: &ServerMessage, exclude: Option<ConnectionId>) {
        let Some(frame) = Self::frame(message) else {
            return;
        };
        for client in self.clients.values() {
            if Some(client.id) == exclude {
                continue;
            }
            if !client.queue(frame.clone()) {
                debug!("Writer for client {} is gone", client.id);
            }
        }
    }

    fn broadcast_raw(&mut self, bytes: &[u8]) {
        let payload: Arc<[u8]> = bytes.into();
        for addr in self.clients.values().filter_map(|client| client.datagram_addr) {
            if self.datagrams.send((payload.clone(), addr)).is_err() {
                debug!("Datagram sender is gone");
                return;
            }
        }
    }
}
