//! Recent inbound events, for diagnostics
//!
//! - Event: envelope with sequence id + receive time + raw payload
//! - RecentEvents: bounded ring, newest first, oldest evicted on overflow

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many raw events the ring keeps
pub const MAX_RECENT_EVENTS: usize = 10;

/// Single inbound event as received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Wall-clock receive time (ms since the Unix epoch)
    pub received_ms: u64,
    /// Raw decoded payload, untouched
    pub payload: Value,
}

impl Event {
    /// Discriminant of the payload, if it has one
    pub fn kind(&self) -> Option<&str> {
        crate::message::kind_of(&self.payload)
    }
}

/// Bounded, newest-first log of raw inbound payloads
#[derive(Debug, Clone, PartialEq)]
pub struct RecentEvents {
    events: VecDeque<Event>,
    capacity: usize,
    next_id: u64,
}

impl RecentEvents {
    pub fn new() -> Self {
        Self::with_capacity(MAX_RECENT_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    /// Record a payload at the front, evicting the oldest past capacity.
    /// Returns the event's sequence id.
    pub fn push(&mut self, payload: Value) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.events.push_front(Event {
            id,
            received_ms: now_ms(),
            payload,
        });
        self.events.truncate(self.capacity);
        id
    }

    /// Events, newest first
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Payloads, newest first (cloned)
    pub fn payloads(&self) -> Vec<Value> {
        self.events.iter().map(|e| e.payload.clone()).collect()
    }

    pub fn newest(&self) -> Option<&Event> {
        self.events.front()
    }

    /// Total events ever recorded, including evicted ones
    pub fn total(&self) -> u64 {
        self.next_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.events).unwrap_or(Value::Null)
    }
}

impl Default for RecentEvents {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
