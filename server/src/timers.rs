//! Deferred room callbacks
//!
//! Rooms never hold timers themselves. A room asks for a callback by pushing
//! a `TimerRequest` tagged with its current epoch. The registry moves the
//! request into the shared `TimerQueue` along with the room id and room
//! instance. When an entry comes due it is delivered only if a room with
//! that id and instance still exists and still has that epoch. Any
//! transition in between makes the entry stale.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    CountdownExpired,
    GameoverExpired,
    RoundTimeout,
}

/// A callback requested by a room, not yet bound to a room identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub kind: TimerKind,
    pub due: Instant,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
pub struct ScheduledTimer {
    pub room_id: String,
    /// Distinguishes a room from a later room created under the same id
    pub instance: u64,
    pub epoch: u64,
    pub kind: TimerKind,
    pub due: Instant,
    order: u64,
}

impl PartialEq for ScheduledTimer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledTimer {}

impl PartialOrd for ScheduledTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.order.cmp(&other.order))
    }
}

/// Min-heap of pending callbacks ordered by due time, then insertion order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<ScheduledTimer>>,
    next_order: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, room_id: &str, instance: u64, request: TimerRequest) {
        let timer = ScheduledTimer {
            room_id: room_id.to_string(),
            instance,
            epoch: request.epoch,
            kind: request.kind,
            due: request.due,
            order: self.next_order,
        };
        self.next_order += 1;
        self.heap.push(Reverse(timer));
    }

    /// Removes and returns every timer due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<ScheduledTimer> {
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.heap.peek() {
            if next.due > now {
                break;
            }
            if let Some(Reverse(timer)) = self.heap.pop() {
                due.push(timer);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
