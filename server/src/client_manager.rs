//! Connection registry for the arena server
//!
//! This module tracks every admitted WebSocket connection:
//! - Identity assignment and capacity enforcement
//! - Display names that never collide with a connected player's name
//! - Per-connection bounded outbound queues for non-blocking fan-out
//! - A release signal that ends the connection task once a client is removed
//!
//! The registry never touches the world itself; the server pairs each
//! admitted client with a player in the game state.

use log::{debug, info, warn};
use shared::PlayerId;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::utils::display_name;

/// Result of queueing a message for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The connection's writer has already gone away
    Closed,
    /// The peer is not draining its queue fast enough
    Full,
}

/// Represents an admitted connection
#[derive(Debug)]
pub struct Client {
    /// Unique identity, never reused while the server runs
    pub id: PlayerId,
    /// Remote address, kept for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Number used in the display name
    pub name_slot: u32,
    pub display_name: String,
    sender: mpsc::Sender<Message>,
    /// Tells the connection task to shut its socket
    release: oneshot::Sender<()>,
}

impl Client {
    pub fn new(
        id: PlayerId,
        addr: SocketAddr,
        name_slot: u32,
        sender: mpsc::Sender<Message>,
        release: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            name_slot,
            display_name: display_name(name_slot),
            sender,
            release,
        }
    }

    /// Queues a message without waiting for the peer
    pub fn send(&self, message: Message) -> Delivery {
        match self.sender.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
            Err(TrySendError::Full(_)) => Delivery::Full,
        }
    }
}

/// Tracks connected clients and enforces the player limit
///
/// Ids are handed out from a counter starting at 1, so ascending id order is
/// join order. That order is used wherever the simulation needs a
/// deterministic tie-break.
pub struct ClientManager {
    clients: BTreeMap<PlayerId, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Attempts to admit a new connection
    ///
    /// Returns None if the server is at capacity, in which case nothing is
    /// recorded. The display name uses the smallest number not held by a
    /// connected client, which is the connected count plus one as long as
    /// nobody has left.
    ///
    /// `release` fires when the client is later removed for any reason.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
        release: oneshot::Sender<()>,
    ) -> Option<PlayerId> {
        if self.is_full() {
            return None;
        }

        let client_id = PlayerId(self.next_client_id);
        self.next_client_id += 1;

        let client = Client::new(client_id, addr, self.free_name_slot(), sender, release);
        info!(
            "Client {} ({}) connected from {}",
            client_id, client.display_name, addr
        );
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    fn free_name_slot(&self) -> u32 {
        let mut slot = 1;
        while self.clients.values().any(|client| client.name_slot == slot) {
            slot += 1;
        }
        slot
    }

    /// Removes a client and releases its connection. Returns false if they
    /// were already gone.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} disconnected after {:.1}s",
                client.id,
                client.connected_at.elapsed().as_secs_f32()
            );
            // The connection task may already be gone
            let _ = client.release.send(());
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: &PlayerId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    pub fn contains(&self, client_id: &PlayerId) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Queues a text frame for one client. Unknown ids count as closed.
    pub fn send_to(&self, client_id: &PlayerId, text: &str) -> Delivery {
        match self.clients.get(client_id) {
            Some(client) => client.send(Message::text(text.to_string())),
            None => Delivery::Closed,
        }
    }

    /// Queues a text frame for every client
    ///
    /// Closed connections are skipped; their reader reports the disconnect.
    /// Returns the clients whose queue overflowed so the caller can drop them.
    pub fn broadcast(&self, text: &str) -> Vec<PlayerId> {
        let mut overflowed = Vec::new();

        for (client_id, client) in &self.clients {
            match client.send(Message::text(text.to_string())) {
                Delivery::Queued => {}
                Delivery::Closed => debug!("Skipping closed connection {}", client_id),
                Delivery::Full => {
                    warn!("Outbound queue full for client {}", client_id);
                    overflowed.push(*client_id);
                }
            }
        }

        overflowed
    }

    /// Sends a normal close frame to every client and forgets them all
    pub fn close_all(&mut self, reason: &str) -> usize {
        let clients = std::mem::take(&mut self.clients);
        let count = clients.len();
        for client in clients.into_values() {
            let _ = client.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: reason.to_string().into(),
            })));
            let _ = client.release.send(());
        }
        count
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
