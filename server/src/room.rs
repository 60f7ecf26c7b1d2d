//! Room lifecycle and per-room simulation
//!
//! A room cycles `lobby -> countdown -> playing -> gameover -> lobby` for as
//! long as it has players. All mutation goes through the methods on `Room`;
//! the player map and course are never handed out mutably.
//!
//! Time never advances on its own inside a room. Callers pass `now` into
//! every method that needs it, and deadlines leave the room as
//! `TimerRequest`s (see `timers`) that come back through `fire_timer`.
//! Every transition bumps the room's epoch, so a callback requested before
//! the transition is recognised as stale and ignored.

use crate::config::GameConfig;
use crate::course::generate_course;
use crate::physics::{step_player, StepOutcome};
use crate::player::Player;
use crate::timers::{TimerKind, TimerRequest};
use crate::utils::deadline_to_wall_ms;
use log::{debug, info};
use rand::Rng;
use shared::{ClientId, Course, LifecycleState, RoomSnapshot, RoomSummary, START_X};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub struct Room {
    id: String,
    /// Registry-unique number, so a recreated room with the same id is a different room
    instance: u64,
    epoch: u64,
    state: LifecycleState,
    course: Option<Course>,
    /// Ordered by id so every tick visits players in the same order
    players: BTreeMap<ClientId, Player>,
    countdown_deadline: Option<Instant>,
    winner_id: Option<ClientId>,
    pending_timers: Vec<TimerRequest>,
    config: Arc<GameConfig>,
}

impl Room {
    pub fn new(id: impl Into<String>, instance: u64, config: Arc<GameConfig>) -> Self {
        Self {
            id: id.into(),
            instance,
            epoch: 0,
            state: LifecycleState::Lobby,
            course: None,
            players: BTreeMap::new(),
            countdown_deadline: None,
            winner_id: None,
            pending_timers: Vec::new(),
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn course(&self) -> Option<&Course> {
        self.course.as_ref()
    }

    pub fn winner_id(&self) -> Option<ClientId> {
        self.winner_id
    }

    pub fn player(&self, id: ClientId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_ids(&self) -> Vec<ClientId> {
        self.players.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players counted toward the minimum-player and readiness gates
    pub fn eligible_count(&self) -> usize {
        self.players.values().filter(|p| !p.spectator).count()
    }

    pub fn spectator_count(&self) -> usize {
        self.players.values().filter(|p| p.spectator).count()
    }

    pub fn ready_count(&self) -> usize {
        self.players
            .values()
            .filter(|p| !p.spectator && p.ready)
            .count()
    }

    /// A course exists exactly while playing or showing the game-over screen.
    pub fn course_invariant_holds(&self) -> bool {
        self.course.is_some() == self.state.has_course()
    }

    /// Adds a player. Returns true if they join as a spectator, which happens
    /// whenever a round is in progress or just finished.
    pub fn join(&mut self, id: ClientId, name: String) -> bool {
        let spectator = self.state.has_course();
        info!(
            "Room {}: player {} ({}) joined during {}{}",
            self.id,
            id,
            name,
            self.state,
            if spectator { " as spectator" } else { "" }
        );
        self.players.insert(id, Player::new(id, name, spectator));
        spectator
    }

    /// Removes a player. A countdown that no longer has enough eligible
    /// players falls back to the lobby.
    pub fn leave(&mut self, id: ClientId) -> bool {
        if self.players.remove(&id).is_none() {
            return false;
        }
        info!("Room {}: player {} left", self.id, id);

        if self.state == LifecycleState::Countdown
            && self.eligible_count() < self.config.min_players
        {
            info!("Room {}: countdown aborted, not enough players", self.id);
            self.countdown_deadline = None;
            self.transition(LifecycleState::Lobby);
        }
        true
    }

    pub fn set_ready(&mut self, id: ClientId, ready: bool) -> bool {
        if self.state != LifecycleState::Lobby {
            return false;
        }
        match self.players.get_mut(&id) {
            Some(player) if !player.spectator => {
                player.ready = ready;
                true
            }
            _ => false,
        }
    }

    pub fn flap(&mut self, id: ClientId, now: Instant) -> bool {
        if self.state != LifecycleState::Playing {
            return false;
        }
        let cooldown = self.config.flap_cooldown;
        match self.players.get_mut(&id) {
            Some(player) if !player.spectator => {
                let accepted = player.try_flap(now, cooldown);
                if !accepted {
                    debug!("Room {}: flap from {} dropped by rate limit", self.id, id);
                }
                accepted
            }
            _ => false,
        }
    }

    /// Handles a manual restart according to the configured policy.
    ///
    /// Returns true if the room was reset. Spectators cannot restart.
    pub fn restart(&mut self, id: ClientId, now: Instant) -> bool {
        let eligible = matches!(self.players.get(&id), Some(player) if !player.spectator);
        if !eligible {
            return false;
        }

        let policy = self.config.restart;
        if self.state != LifecycleState::Gameover && !policy.from_any_state {
            return false;
        }

        info!(
            "Room {}: restart requested by {} during {}",
            self.id, id, self.state
        );
        self.enter_lobby();
        if policy.skip_lobby && self.eligible_count() >= self.config.min_players {
            self.enter_countdown(now);
        }
        true
    }

    /// One physics tick. Also re-evaluates the lobby start gate.
    pub fn step(&mut self, now: Instant) {
        match self.state {
            LifecycleState::Lobby => {
                if self.ready_to_start() {
                    self.enter_countdown(now);
                }
            }
            LifecycleState::Playing => self.step_physics(now),
            LifecycleState::Countdown | LifecycleState::Gameover => {}
        }
    }

    /// Delivers a deferred callback. Returns false if it was stale.
    pub fn fire_timer<R: Rng + ?Sized>(
        &mut self,
        kind: TimerKind,
        epoch: u64,
        now: Instant,
        rng: &mut R,
    ) -> bool {
        if epoch != self.epoch {
            debug!(
                "Room {}: ignoring stale {:?} (epoch {} != {})",
                self.id, kind, epoch, self.epoch
            );
            return false;
        }

        match (kind, self.state) {
            (TimerKind::CountdownExpired, LifecycleState::Countdown) => self.start_round(now, rng),
            (TimerKind::GameoverExpired, LifecycleState::Gameover) => self.enter_lobby(),
            (TimerKind::RoundTimeout, LifecycleState::Playing) => {
                info!("Room {}: round timed out without a winner", self.id);
                self.enter_gameover(None, now);
            }
            (kind, state) => {
                debug!("Room {}: {:?} does not apply in {}", self.id, kind, state);
                return false;
            }
        }
        true
    }

    /// Hands pending timer requests to the caller.
    pub fn take_timer_requests(&mut self) -> Vec<TimerRequest> {
        std::mem::take(&mut self.pending_timers)
    }

    pub fn snapshot(&self, now: Instant, server_time: u64) -> RoomSnapshot {
        let countdown_ends_at = match (self.state, self.countdown_deadline) {
            (LifecycleState::Countdown, Some(deadline)) => {
                Some(deadline_to_wall_ms(deadline, now, server_time))
            }
            _ => None,
        };

        RoomSnapshot {
            server_time,
            state: self.state,
            countdown_ends_at,
            winner_id: self.winner_id,
            course: self.course.clone(),
            players: self.players.values().map(Player::view).collect(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            state: self.state,
            players: self.eligible_count(),
            spectators: self.spectator_count(),
            ready: self.ready_count(),
        }
    }

    fn ready_to_start(&self) -> bool {
        let eligible = self.eligible_count();
        eligible > 0
            && eligible >= self.config.min_players
            && self
                .players
                .values()
                .filter(|p| !p.spectator)
                .all(|p| p.ready)
    }

    fn step_physics(&mut self, now: Instant) {
        let Some(course) = self.course.as_ref() else {
            return;
        };

        let mut finisher = None;
        for (id, player) in self.players.iter_mut() {
            if player.spectator {
                continue;
            }
            match step_player(player, course) {
                StepOutcome::Flying => {}
                StepOutcome::Crashed => debug!("Room {}: player {} crashed", self.id, id),
                StepOutcome::Finished => {
                    finisher = Some(*id);
                    break;
                }
            }
        }

        if let Some(id) = finisher {
            if self.winner_id.is_none() {
                self.enter_gameover(Some(id), now);
            }
        }
    }

    fn enter_countdown(&mut self, now: Instant) {
        let deadline = now + self.config.countdown;
        self.countdown_deadline = Some(deadline);
        self.transition(LifecycleState::Countdown);
        self.schedule(TimerKind::CountdownExpired, deadline);
    }

    fn start_round<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) {
        let course = generate_course(rng, self.config.pipe_count);
        for player in self.players.values_mut().filter(|p| !p.spectator) {
            player.reset_round(course.start_x);
        }
        self.course = Some(course);
        self.countdown_deadline = None;
        self.winner_id = None;
        self.transition(LifecycleState::Playing);

        if let Some(timeout) = self.config.round_timeout {
            self.schedule(TimerKind::RoundTimeout, now + timeout);
        }
    }

    fn enter_gameover(&mut self, winner: Option<ClientId>, now: Instant) {
        self.winner_id = winner;
        if let Some(player) = winner.and_then(|id| self.players.get(&id)) {
            info!(
                "Room {}: player {} ({}) wins",
                self.id, player.id, player.name
            );
        }
        self.transition(LifecycleState::Gameover);
        self.schedule(TimerKind::GameoverExpired, now + self.config.gameover);
    }

    /// Clears the round and makes every connected player eligible again.
    fn enter_lobby(&mut self) {
        for player in self.players.values_mut() {
            player.ready = false;
            player.spectator = false;
            player.reset_round(START_X);
        }
        self.course = None;
        self.winner_id = None;
        self.countdown_deadline = None;
        self.transition(LifecycleState::Lobby);
    }

    fn transition(&mut self, next: LifecycleState) {
        info!("Room {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.epoch += 1;
    }

    fn schedule(&mut self, kind: TimerKind, due: Instant) {
        self.pending_timers.push(TimerRequest {
            kind,
            due,
            epoch: self.epoch,
        });
    }
}
