//! Connection tracking and outbound delivery for the game server
//!
//! This module keeps the server-side view of every open WebSocket:
//! - Connection lifecycle (accept, capacity check, close)
//! - Connection id assignment; the id doubles as the player id
//! - Address lookup so socket events can be routed to a connection
//! - Non-blocking delivery of encoded messages to each socket's writer task
//!
//! Sends never wait. A connection whose outbound buffer is full simply misses
//! that message; the next snapshot supersedes it anyway.

use crate::gateway::ProtocolError;
use log::{debug, info};
use shared::{ClientId, ServerMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::Message;

/// Frames buffered per connection before sends start being dropped
pub const OUTBOUND_BUFFER: usize = 64;

/// Serializes a server message into a text frame.
pub fn encode(message: &ServerMessage) -> Result<Message, serde_json::Error> {
    serde_json::to_string(message).map(Message::Text)
}

/// Tells a socket it cannot be admitted, then closes it.
///
/// Used for sockets that never got a connection id.
pub fn reject(sender: &mpsc::Sender<Message>, error: &ProtocolError) {
    let reply = ServerMessage::Error {
        message: error.to_string(),
    };
    if let Ok(frame) = encode(&reply) {
        if let Err(e) = sender.try_send(frame) {
            debug!("Could not deliver rejection: {}", e);
        }
    }
    if let Err(e) = sender.try_send(Message::Close(None)) {
        debug!("Could not close rejected socket: {}", e);
    }
}

/// An open socket that has been admitted to the server
#[derive(Debug)]
pub struct Connection {
    /// Unique id assigned on admission
    pub id: ClientId,
    /// Peer address, used to route socket events
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Feeds the socket's writer task
    sender: mpsc::Sender<Message>,
}

impl Connection {
    pub fn new(id: ClientId, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
        }
    }

    /// Queues a frame without waiting.
    ///
    /// Returns false if the frame was dropped because the buffer is full or
    /// the writer task is gone.
    pub fn try_send(&self, frame: Message) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Outbound buffer full for client {}, dropping frame", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Writer for client {} is gone, dropping frame", self.id);
                false
            }
        }
    }
}

/// Manages all admitted connections
///
/// Enforces the server's connection capacity and hands out ids. Ids start at
/// 1 and are never reused within a process.
pub struct ConnectionManager {
    connections: HashMap<ClientId, Connection>,
    next_client_id: ClientId,
    max_clients: usize,
}

impl ConnectionManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to admit a new socket
    ///
    /// Returns Some(client_id) if successful, None if the server is at capacity.
    pub fn add_connection(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    ) -> Option<ClientId> {
        if self.connections.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);

        info!("Client {} connected from {}", client_id, addr);
        self.connections
            .insert(client_id, Connection::new(client_id, addr, sender));
        Some(client_id)
    }

    /// Drops a connection and its outbound channel
    ///
    /// Returns true if the connection was known.
    pub fn remove_connection(&mut self, client_id: ClientId) -> bool {
        if let Some(connection) = self.connections.remove(&client_id) {
            info!(
                "Client {} disconnected after {:.1}s",
                connection.id,
                connection.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.connections
            .iter()
            .find(|(_, connection)| connection.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Encodes and queues a message for one connection.
    pub fn send_to(&self, client_id: ClientId, message: &ServerMessage) -> bool {
        let Some(connection) = self.connections.get(&client_id) else {
            return false;
        };
        match encode(message) {
            Ok(frame) => connection.try_send(frame),
            Err(e) => {
                debug!("Failed to encode message for client {}: {}", client_id, e);
                false
            }
        }
    }

    /// Queues an already encoded text frame for each recipient.
    ///
    /// Returns how many connections accepted the frame. Unknown ids are skipped.
    pub fn broadcast(&self, recipients: &[ClientId], text: &str) -> usize {
        recipients
            .iter()
            .filter_map(|id| self.connections.get(id))
            .filter(|connection| connection.try_send(Message::Text(text.to_string())))
            .count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
