//! Per-connection simulation state
//!
//! A `Player` exists only inside the room it joined. Besides the visible
//! state that goes into snapshots it keeps two pieces of private
//! bookkeeping: the time of the last accepted flap (for the per-player rate
//! limit) and the set of pipes already scored this round.

use crate::utils::trim_and_cap;
use shared::{ClientId, PlayerView, FLAP_VELOCITY, MAX_NAME_LEN, START_X, START_Y};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Trims a display name and caps it at `MAX_NAME_LEN` characters.
///
/// Returns `None` when nothing is left after trimming.
pub fn sanitize_name(raw: &str) -> Option<String> {
    trim_and_cap(raw, MAX_NAME_LEN)
}

#[derive(Debug, Clone)]
pub struct Player {
    /// Connection id, stable for the lifetime of the socket
    pub id: ClientId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub vy: f32,
    pub ready: bool,
    /// Joined mid-round; sits out until the next lobby
    pub spectator: bool,
    /// Pipes cleared since the last round start or crash
    pub progress: u32,
    last_flap: Option<Instant>,
    scored: HashSet<u32>,
}

impl Player {
    pub fn new(id: ClientId, name: String, spectator: bool) -> Self {
        Self {
            id,
            name,
            x: START_X,
            y: START_Y,
            vy: 0.0,
            ready: false,
            spectator,
            progress: 0,
            last_flap: None,
            scored: HashSet::new(),
        }
    }

    /// Puts the player back on the start line with a clean round record.
    pub fn reset_round(&mut self, start_x: f32) {
        self.x = start_x;
        self.y = START_Y;
        self.vy = 0.0;
        self.progress = 0;
        self.scored.clear();
    }

    /// Applies the flap impulse unless the last accepted flap was less than
    /// `cooldown` ago. Rejected flaps leave the timer untouched.
    pub fn try_flap(&mut self, now: Instant, cooldown: Duration) -> bool {
        if let Some(last) = self.last_flap {
            if now.saturating_duration_since(last) < cooldown {
                return false;
            }
        }
        self.vy = FLAP_VELOCITY;
        self.last_flap = Some(now);
        true
    }

    /// Records a pipe as cleared. Returns false if it was already counted.
    pub fn mark_scored(&mut self, seq: u32) -> bool {
        if self.scored.insert(seq) {
            self.progress += 1;
            true
        } else {
            false
        }
    }

    pub fn has_scored(&self, seq: u32) -> bool {
        self.scored.contains(&seq)
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            vy: self.vy,
            ready: self.ready,
            spectator: self.spectator,
            progress: self.progress,
        }
    }
}
