//! # Race Server Library
//!
//! Authoritative server for a multiplayer side-scrolling flap race. Browser
//! clients connect over WebSocket, join named rooms, and race through a
//! course of pipes that the server generates and simulates. Clients only
//! send intents (`ready`, `flap`, `restart`) and render the snapshots the
//! server broadcasts.
//!
//! ## Room Lifecycle
//!
//! Every room cycles through four states:
//!
//! ```text
//! lobby --all eligible ready--> countdown --deadline--> playing
//!   ^                                                      |
//!   +------------- deadline ------- gameover <--finish-----+
//! ```
//!
//! Late joiners become spectators until the next lobby. Countdown and game
//! over are wall-clock deadlines, not tick counts.
//!
//! ## Architecture
//!
//! ### Single-Owner Event Loop
//! All room state lives in one `Registry` owned by the `Server` run loop.
//! Socket tasks never touch rooms; they forward events over a channel. The
//! loop interleaves three sources: socket events, the physics tick, and the
//! broadcast tick. Since one task does all mutation, a tick always sees a
//! consistent course and consistent peer positions.
//!
//! ### Deferred Callbacks
//! Rooms request timers instead of owning them. Each request carries the
//! room's epoch, which is bumped on every transition; the registry also
//! records the room instance. A timer that outlives its room or its state is
//! discarded when it fires. See [`timers`].
//!
//! ### Outbound Delivery
//! Each socket has a bounded writer queue. Sends never block the loop; a full
//! queue drops the frame and the next snapshot replaces it.
//!
//! ## Module Organization
//!
//! - `config`: tuning and policy knobs, validated at startup
//! - `course`: random pipe layout per round
//! - `player` / `physics`: per-player state and the fixed-step integrator
//! - `room`: the lifecycle state machine
//! - `timers` / `registry`: deferred callbacks and room ownership
//! - `gateway`: inbound message parsing and validation
//! - `connection_manager` / `network`: sockets, capacity, and the run loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", GameConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection_manager;
pub mod course;
pub mod gateway;
pub mod network;
pub mod physics;
pub mod player;
pub mod registry;
pub mod room;
pub mod timers;
pub mod utils;
