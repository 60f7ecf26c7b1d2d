use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type ClientId = u32;

pub const WORLD_HEIGHT: f32 = 600.0;
pub const GROUND_HEIGHT: f32 = 80.0;
/// Lowest y a player may reach before hitting the ground band.
pub const PLAY_BOTTOM: f32 = WORLD_HEIGHT - GROUND_HEIGHT;
pub const PLAYER_RADIUS: f32 = 14.0;

pub const GRAVITY: f32 = 0.45;
pub const FLAP_VELOCITY: f32 = -7.5;
pub const RUN_SPEED: f32 = 3.0;

pub const PIPE_WIDTH: f32 = 70.0;
pub const PIPE_HALF_WIDTH: f32 = PIPE_WIDTH / 2.0;
pub const PIPE_GAP: f32 = 160.0;
pub const PIPE_SPACING: f32 = 260.0;
pub const FIRST_PIPE_OFFSET: f32 = 400.0;
pub const GAP_MARGIN: f32 = 50.0;
pub const PIPE_COUNT: u32 = 12;
pub const FINISH_OFFSET: f32 = 200.0;

pub const START_X: f32 = 100.0;
pub const START_Y: f32 = 260.0;

pub const MIN_PLAYERS: usize = 2;
pub const COUNTDOWN_MS: u64 = 3_000;
pub const GAMEOVER_MS: u64 = 5_000;
pub const ROUND_TIMEOUT_MS: u64 = 180_000;
pub const FLAP_COOLDOWN_MS: u64 = 150;

pub const TICK_RATE: u32 = 60;
pub const BROADCAST_RATE: u32 = 20;

pub const MAX_NAME_LEN: usize = 16;
pub const MAX_ROOM_ID_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Lobby,
    Countdown,
    Playing,
    Gameover,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Lobby => "lobby",
            LifecycleState::Countdown => "countdown",
            LifecycleState::Playing => "playing",
            LifecycleState::Gameover => "gameover",
        }
    }

    /// Whether a course must exist in this state.
    pub fn has_course(&self) -> bool {
        matches!(self, LifecycleState::Playing | LifecycleState::Gameover)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One obstacle: a vertical pair of pipes with a gap between `top` and `bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pipe {
    pub seq: u32,
    /// Horizontal center of the pipe.
    pub x: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Pipe {
    pub fn leading_edge(&self) -> f32 {
        self.x - PIPE_HALF_WIDTH
    }

    pub fn trailing_edge(&self) -> f32 {
        self.x + PIPE_HALF_WIDTH
    }

    pub fn gap_center(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub pipes: Vec<Pipe>,
    pub start_x: f32,
    pub finish_x: f32,
}

impl Course {
    /// Number of pipes a player must clear before the finish line counts.
    pub fn required_progress(&self) -> u32 {
        self.pipes.len() as u32
    }

    /// First pipe whose trailing edge is still ahead of `x`.
    pub fn next_pipe(&self, x: f32) -> Option<&Pipe> {
        self.pipes.iter().find(|pipe| pipe.trailing_edge() >= x)
    }
}

/// Returns true if a circle at (`x`, `y`) overlaps the solid part of `pipe`.
pub fn hits_pipe(x: f32, y: f32, radius: f32, pipe: &Pipe) -> bool {
    let within_window = x >= pipe.leading_edge() && x <= pipe.trailing_edge();
    within_window && (y - radius < pipe.top || y + radius > pipe.bottom)
}

/// Returns true once `x` is strictly beyond the pipe's trailing edge.
pub fn passed_pipe(x: f32, pipe: &Pipe) -> bool {
    x > pipe.trailing_edge()
}

/// Messages sent by browser clients.
///
/// `join` carries raw JSON values so that a non-string name or room id can be
/// reported as a validation error instead of a generic parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Join {
        #[serde(rename = "roomId", default)]
        room_id: Value,
        #[serde(default)]
        name: Value,
    },
    Ready {
        #[serde(default = "default_ready")]
        ready: bool,
    },
    Flap,
    Restart,
    ListRooms,
}

fn default_ready() -> bool {
    true
}

impl ClientMessage {
    /// Wire names of every inbound message kind.
    pub const KINDS: [&'static str; 5] = ["join", "ready", "flap", "restart", "listRooms"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Joined {
        id: ClientId,
        #[serde(rename = "roomId")]
        room_id: String,
    },
    State(RoomSnapshot),
    Error {
        message: String,
    },
    Rooms {
        rooms: Vec<RoomSummary>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: ClientId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub vy: f32,
    pub ready: bool,
    pub spectator: bool,
    pub progress: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Server wall clock in milliseconds since the Unix epoch.
    pub server_time: u64,
    pub state: LifecycleState,
    pub countdown_ends_at: Option<u64>,
    pub winner_id: Option<ClientId>,
    pub course: Option<Course>,
    pub players: Vec<PlayerView>,
}

impl RoomSnapshot {
    pub fn player(&self, id: ClientId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub state: LifecycleState,
    pub players: usize,
    pub spectators: usize,
    pub ready: usize,
}
