//! Process-wide room registry
//!
//! Owns every room, the mapping from connection to room, the timer queue and
//! the random source used for course generation. Rooms are created on the
//! first join to an unseen id and dropped as soon as their last player
//! leaves. Timers for dropped rooms stay in the queue and are discarded when
//! they come due.

use crate::config::GameConfig;
use crate::gateway::ProtocolError;
use crate::room::Room;
use crate::timers::TimerQueue;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientId, RoomSnapshot, RoomSummary};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room_id: String,
    pub spectator: bool,
}

/// One room's snapshot together with the connections that should receive it.
#[derive(Debug, Clone)]
pub struct RoomBroadcast {
    pub room_id: String,
    pub recipients: Vec<ClientId>,
    pub snapshot: RoomSnapshot,
}

pub struct Registry {
    config: Arc<GameConfig>,
    rooms: HashMap<String, Room>,
    memberships: HashMap<ClientId, String>,
    timers: TimerQueue,
    next_instance: u64,
    rng: StdRng,
}

impl Registry {
    pub fn new(config: GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config: Arc::new(config),
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            timers: TimerQueue::new(),
            next_instance: 1,
            rng,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Adds a client to a room, creating the room if needed.
    ///
    /// `room_id` and `name` must already be validated.
    pub fn join(
        &mut self,
        client: ClientId,
        room_id: &str,
        name: String,
    ) -> Result<JoinOutcome, ProtocolError> {
        if self.memberships.contains_key(&client) {
            return Err(ProtocolError::AlreadyJoined);
        }

        let room = match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let instance = self.next_instance;
                self.next_instance += 1;
                info!("Room {} created", room_id);
                entry.insert(Room::new(room_id, instance, Arc::clone(&self.config)))
            }
        };

        let spectator = room.join(client, name);
        self.memberships.insert(client, room_id.to_string());

        Ok(JoinOutcome {
            room_id: room_id.to_string(),
            spectator,
        })
    }

    /// Removes a client from whatever room it is in.
    ///
    /// Returns the id of the room it left. The room is destroyed right away
    /// if it became empty.
    pub fn leave(&mut self, client: ClientId) -> Option<String> {
        let room_id = self.memberships.remove(&client)?;

        let now_empty = match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.leave(client);
                room.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.rooms.remove(&room_id);
            info!("Room {} destroyed", room_id);
        } else {
            self.collect_timers_for(&room_id);
        }
        Some(room_id)
    }

    pub fn set_ready(&mut self, client: ClientId, ready: bool) -> Result<bool, ProtocolError> {
        self.with_member_room(client, |room| room.set_ready(client, ready))
    }

    pub fn flap(&mut self, client: ClientId, now: Instant) -> Result<bool, ProtocolError> {
        self.with_member_room(client, |room| room.flap(client, now))
    }

    pub fn restart(&mut self, client: ClientId, now: Instant) -> Result<bool, ProtocolError> {
        self.with_member_room(client, |room| room.restart(client, now))
    }

    /// One simulation clock tick: deliver due timers, then step every room.
    pub fn tick(&mut self, now: Instant) {
        for timer in self.timers.pop_due(now) {
            match self.rooms.get_mut(&timer.room_id) {
                Some(room) if room.instance() == timer.instance => {
                    room.fire_timer(timer.kind, timer.epoch, now, &mut self.rng);
                }
                _ => debug!(
                    "Dropping {:?} for room {} (instance {} is gone)",
                    timer.kind, timer.room_id, timer.instance
                ),
            }
        }

        for room in self.rooms.values_mut() {
            room.step(now);
        }

        for room in self.rooms.values_mut() {
            for request in room.take_timer_requests() {
                self.timers.schedule(room.id(), room.instance(), request);
            }
        }
    }

    /// Fresh snapshots of every room, computed from current state.
    pub fn snapshots(&self, now: Instant, server_time: u64) -> Vec<RoomBroadcast> {
        self.rooms
            .values()
            .map(|room| RoomBroadcast {
                room_id: room.id().to_string(),
                recipients: room.player_ids(),
                snapshot: room.snapshot(now, server_time),
            })
            .collect()
    }

    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self.rooms.values().map(Room::summary).collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn with_member_room<T>(
        &mut self,
        client: ClientId,
        action: impl FnOnce(&mut Room) -> T,
    ) -> Result<T, ProtocolError> {
        let room_id = self
            .memberships
            .get(&client)
            .cloned()
            .ok_or(ProtocolError::NotJoined)?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(ProtocolError::NotJoined)?;
        let result = action(room);
        self.collect_timers_for(&room_id);
        Ok(result)
    }

    fn collect_timers_for(&mut self, room_id: &str) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            for request in room.take_timer_requests() {
                self.timers.schedule(room_id, room.instance(), request);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::LifecycleState;
    use std::time::Duration;

    fn registry() -> Registry {
        Registry::new(GameConfig {
            seed: Some(9),
            ..GameConfig::default()
        })
    }

    fn start_countdown(registry: &mut Registry, room: &str, ids: &[ClientId], now: Instant) {
        for id in ids {
            registry.join(*id, room, format!("p{}", id)).unwrap();
        }
        for id in ids {
            registry.set_ready(*id, true).unwrap();
        }
        registry.tick(now);
    }

    #[test]
    fn test_first_join_creates_room() {
        let mut registry = registry();
        assert!(registry.room("alpha").is_none());
        let outcome = registry.join(1, "alpha", "Ann".to_string()).unwrap();
        assert_eq!(outcome.room_id, "alpha");
        assert!(!outcome.spectator);
        assert_eq!(registry.room_count(), 1);
        let instance = registry.room("alpha").unwrap().instance();

        // A second join reuses the room rather than replacing it
        registry.join(2, "alpha", "Bo".to_string()).unwrap();
        assert_eq!(registry.room_count(), 1);
        let room = registry.room("alpha").unwrap();
        assert_eq!(room.len(), 2);
        assert_eq!(room.instance(), instance);
    }

    #[test]
    fn test_last_leave_destroys_room() {
        let mut registry = registry();
        registry.join(1, "alpha", "Ann".to_string()).unwrap();
        registry.join(2, "alpha", "Bo".to_string()).unwrap();

        assert_eq!(registry.leave(1), Some("alpha".to_string()));
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.leave(2), Some("alpha".to_string()));
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.leave(2), None);
    }

    #[test]
    fn test_double_join_rejected() {
        let mut registry = registry();
        registry.join(1, "alpha", "Ann".to_string()).unwrap();
        assert_eq!(
            registry.join(1, "beta", "Ann".to_string()),
            Err(ProtocolError::AlreadyJoined)
        );
        assert!(registry.room("beta").is_none());
    }

    #[test]
    fn test_inputs_from_unjoined_client() {
        let mut registry = registry();
        let now = Instant::now();
        assert_eq!(registry.set_ready(5, true), Err(ProtocolError::NotJoined));
        assert_eq!(registry.flap(5, now), Err(ProtocolError::NotJoined));
        assert_eq!(registry.restart(5, now), Err(ProtocolError::NotJoined));
    }

    #[test]
    fn test_countdown_then_playing_via_ticks() {
        let mut registry = registry();
        let now = Instant::now();
        start_countdown(&mut registry, "alpha", &[1, 2], now);
        assert_eq!(
            registry.room("alpha").unwrap().state(),
            LifecycleState::Countdown
        );
        assert_eq!(registry.pending_timers(), 1);

        registry.tick(now + Duration::from_millis(2_999));
        assert_eq!(
            registry.room("alpha").unwrap().state(),
            LifecycleState::Countdown
        );

        registry.tick(now + Duration::from_millis(3_000));
        let room = registry.room("alpha").unwrap();
        assert_eq!(room.state(), LifecycleState::Playing);
        assert_eq!(room.course().unwrap().pipes.len(), 12);
    }

    #[test]
    fn test_timer_for_destroyed_room_is_dropped() {
        let mut registry = registry();
        let now = Instant::now();
        start_countdown(&mut registry, "alpha", &[1, 2], now);
        registry.leave(1);
        registry.leave(2);
        assert_eq!(registry.room_count(), 0);

        registry.tick(now + Duration::from_secs(5));
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.pending_timers(), 0);
    }

    #[test]
    fn test_timer_for_recreated_room_is_dropped() {
        let mut registry = registry();
        let now = Instant::now();
        start_countdown(&mut registry, "alpha", &[1, 2], now);
        registry.leave(1);
        registry.leave(2);

        // Same id, new room, sitting in the lobby with nobody ready
        registry.join(3, "alpha", "Cy".to_string()).unwrap();
        registry.join(4, "alpha", "Di".to_string()).unwrap();
        registry.tick(now + Duration::from_secs(5));

        let room = registry.room("alpha").unwrap();
        assert_eq!(room.state(), LifecycleState::Lobby);
        assert!(room.course().is_none());
    }

    #[test]
    fn test_spectator_rejoins_after_round() {
        let mut registry = registry();
        let now = Instant::now();
        start_countdown(&mut registry, "alpha", &[1, 2], now);
        registry.tick(now + Duration::from_secs(3));

        let outcome = registry.join(3, "alpha", "Cy".to_string()).unwrap();
        assert!(outcome.spectator);

        // No one finishes; the round timeout ends it, then game over expires
        let timeout = registry.config().round_timeout.unwrap();
        let gameover = registry.config().gameover;
        let end = now + Duration::from_secs(3) + timeout;
        registry.tick(end);
        assert_eq!(
            registry.room("alpha").unwrap().state(),
            LifecycleState::Gameover
        );
        registry.tick(end + gameover);

        let snapshot = &registry.snapshots(end + gameover, 0)[0].snapshot;
        assert_eq!(snapshot.state, LifecycleState::Lobby);
        assert!(!snapshot.player(3).unwrap().spectator);
    }

    #[test]
    fn test_snapshots_address_room_members() {
        let mut registry = registry();
        registry.join(1, "alpha", "Ann".to_string()).unwrap();
        registry.join(2, "beta", "Bo".to_string()).unwrap();
        registry.join(3, "alpha", "Cy".to_string()).unwrap();

        let mut broadcasts = registry.snapshots(Instant::now(), 0);
        broadcasts.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        assert_eq!(broadcasts.len(), 2);
        assert_eq!(broadcasts[0].recipients, vec![1, 3]);
        assert_eq!(broadcasts[1].recipients, vec![2]);
    }

    #[test]
    fn test_list_rooms_sorted() {
        let mut registry = registry();
        registry.join(1, "zeta", "Ann".to_string()).unwrap();
        registry.join(2, "alpha", "Bo".to_string()).unwrap();
        registry.set_ready(2, true).unwrap();

        let rooms = registry.list_rooms();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].id, "alpha");
        assert_eq!(rooms[0].ready, 1);
        assert_eq!(rooms[1].id, "zeta");
        assert_eq!(rooms[1].players, 1);
    }
}
