//! Server network layer handling WebSocket connections and game loop coordination

use crate::config::{ConfigError, GameConfig};
use crate::connection_manager::{self, ConnectionManager, OUTBOUND_BUFFER};
use crate::gateway::{self, ProtocolError};
use crate::registry::Registry;
use crate::utils::server_time_ms;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientId, ServerMessage};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Events sent from socket tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    /// Handshake finished; `sender` feeds the socket's writer task
    Opened {
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    },
    Text {
        addr: SocketAddr,
        text: String,
    },
    Closed {
        addr: SocketAddr,
    },
}

/// Main server coordinating sockets, rooms and the simulation clock
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: Registry,
    connections: ConnectionManager,
    tick_duration: Duration,
    broadcast_duration: Duration,

    // Communication channel from socket tasks
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: GameConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on ws://{}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            connections: ConnectionManager::new(config.max_clients),
            tick_duration: config.tick_duration(),
            broadcast_duration: config.broadcast_duration(),
            registry: Registry::new(config),
            event_tx,
            event_rx,
        })
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Spawns task that accepts TCP connections and hands each to its own task
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let event_tx = event_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = Self::serve_socket(stream, addr, event_tx).await {
                                debug!("Socket {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Runs one socket: handshake, then a writer task fed by the main loop
    /// and a reader loop that forwards frames as events.
    async fn serve_socket(
        stream: TcpStream,
        addr: SocketAddr,
        event_tx: mpsc::UnboundedSender<NetworkEvent>,
    ) -> Result<(), ServerError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut sink, mut source) = ws_stream.split();
        let (sender, mut outbound) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

        if event_tx.send(NetworkEvent::Opened { addr, sender }).is_err() {
            return Ok(());
        }

        tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if let Err(e) = sink.send(frame).await {
                    debug!("Failed to write to {}: {}", addr, e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                // Binary payloads get the same parse errors as bad text
                Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Read error from {}: {}", addr, e);
                    break;
                }
            };
            if event_tx.send(NetworkEvent::Text { addr, text }).is_err() {
                break;
            }
        }

        if let Err(e) = event_tx.send(NetworkEvent::Closed { addr }) {
            error!("Failed to report closed socket {}: {}", addr, e);
        }
        Ok(())
    }

    /// Applies one socket event to connections and rooms
    pub fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Opened { addr, sender } => {
                // Remove existing connection if present
                if let Some(existing_id) = self.connections.find_client_by_addr(addr) {
                    info!("Replacing stale client {} from {}", existing_id, addr);
                    self.drop_client(existing_id);
                }

                if self.connections.add_connection(addr, sender.clone()).is_none() {
                    warn!("Rejecting {}: server full", addr);
                    connection_manager::reject(&sender, &ProtocolError::ServerFull);
                }
            }

            NetworkEvent::Text { addr, text } => {
                let Some(client_id) = self.connections.find_client_by_addr(addr) else {
                    debug!("Frame from unknown socket {}", addr);
                    return;
                };

                match gateway::handle_message(&mut self.registry, client_id, &text, Instant::now())
                {
                    Ok(Some(reply)) => {
                        self.connections.send_to(client_id, &reply);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Client {}: {}", client_id, e);
                        let reply = ServerMessage::Error {
                            message: e.to_string(),
                        };
                        self.connections.send_to(client_id, &reply);
                    }
                }
            }

            NetworkEvent::Closed { addr } => {
                if let Some(client_id) = self.connections.find_client_by_addr(addr) {
                    self.drop_client(client_id);
                }
            }
        }
    }

    fn drop_client(&mut self, client_id: ClientId) {
        self.connections.remove_connection(client_id);
        if let Some(room_id) = self.registry.leave(client_id) {
            info!("Client {} left room {}", client_id, room_id);
        }
    }

    /// Sends every room's current snapshot to the connections in it
    pub fn broadcast_snapshots(&mut self) {
        let now = Instant::now();
        let server_time = server_time_ms();

        for broadcast in self.registry.snapshots(now, server_time) {
            let message = ServerMessage::State(broadcast.snapshot);
            match serde_json::to_string(&message) {
                Ok(text) => {
                    let delivered = self.connections.broadcast(&broadcast.recipients, &text);
                    if delivered < broadcast.recipients.len() {
                        debug!(
                            "Room {}: snapshot reached {}/{} clients",
                            broadcast.room_id,
                            delivered,
                            broadcast.recipients.len()
                        );
                    }
                }
                Err(e) => error!("Failed to encode snapshot for {}: {}", broadcast.room_id, e),
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut broadcast_interval = interval(self.broadcast_duration);
        broadcast_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let stall_threshold = self.tick_duration * 4;
        let mut last_tick = Instant::now();
        let mut ticks: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle socket events
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // One physics step per tick, no catch-up
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let gap = now.duration_since(last_tick);
                    if gap > stall_threshold {
                        warn!("Simulation clock stalled for {:?}", gap);
                    }
                    last_tick = now;

                    self.registry.tick(now);
                    ticks += 1;

                    if ticks % 600 == 0 && !self.connections.is_empty() {
                        debug!("Tick {}: {} clients, {} rooms, {} timers pending",
                               ticks, self.connections.len(), self.registry.room_count(),
                               self.registry.pending_timers());
                    }
                },

                _ = broadcast_interval.tick() => {
                    self.broadcast_snapshots();
                },
            }
        }

        Ok(())
    }
}
