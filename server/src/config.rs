//! Process-wide tuning for rooms and the simulation clock
//!
//! Every room in a process shares one `GameConfig`. Values come from the
//! command line at startup and are never changed per room.

use shared::{
    BROADCAST_RATE, COUNTDOWN_MS, FLAP_COOLDOWN_MS, GAMEOVER_MS, MIN_PLAYERS, PIPE_COUNT,
    ROUND_TIMEOUT_MS, TICK_RATE,
};
use std::time::Duration;
use thiserror::Error;

/// Highest accepted tick or broadcast rate, in Hz
pub const MAX_RATE: u32 = 1_000;

/// Controls what a `restart` message is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestartPolicy {
    /// Honor restart in every state, not only while the game-over screen is up.
    pub from_any_state: bool,
    /// After resetting, go straight to countdown when enough players are
    /// present. Readiness is not required on this path.
    pub skip_lobby: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tick rate must be greater than zero")]
    ZeroTickRate,
    #[error("tick rate must be at most {max} Hz")]
    TickRateTooHigh { max: u32 },
    #[error("broadcast rate must be between 1 and the tick rate ({tick_rate})")]
    InvalidBroadcastRate { tick_rate: u32 },
    #[error("minimum players must be at least 1")]
    ZeroMinPlayers,
    #[error("a course needs at least one pipe")]
    ZeroPipes,
    #[error("max clients must be at least the minimum player count")]
    CapacityTooSmall,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Physics steps per second
    pub tick_rate: u32,
    /// Snapshot broadcasts per second
    pub broadcast_rate: u32,
    pub min_players: usize,
    pub max_clients: usize,
    pub pipe_count: u32,
    pub countdown: Duration,
    pub gameover: Duration,
    /// Ends a round with no winner. `None` lets a round run forever.
    pub round_timeout: Option<Duration>,
    pub flap_cooldown: Duration,
    pub restart: RestartPolicy,
    /// Fixed seed for course generation, mainly for tests and replays.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            broadcast_rate: BROADCAST_RATE,
            min_players: MIN_PLAYERS,
            max_clients: 256,
            pipe_count: PIPE_COUNT,
            countdown: Duration::from_millis(COUNTDOWN_MS),
            gameover: Duration::from_millis(GAMEOVER_MS),
            round_timeout: Some(Duration::from_millis(ROUND_TIMEOUT_MS)),
            flap_cooldown: Duration::from_millis(FLAP_COOLDOWN_MS),
            restart: RestartPolicy::default(),
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.tick_rate as u64)
    }

    pub fn broadcast_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.broadcast_rate as u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.tick_rate > MAX_RATE {
            return Err(ConfigError::TickRateTooHigh { max: MAX_RATE });
        }
        if self.broadcast_rate == 0 || self.broadcast_rate > self.tick_rate {
            return Err(ConfigError::InvalidBroadcastRate {
                tick_rate: self.tick_rate,
            });
        }
        if self.min_players == 0 {
            return Err(ConfigError::ZeroMinPlayers);
        }
        if self.pipe_count == 0 {
            return Err(ConfigError::ZeroPipes);
        }
        if self.max_clients < self.min_players {
            return Err(ConfigError::CapacityTooSmall);
        }
        Ok(())
    }
}
