#![forbid(unsafe_code)]

//! In-process pub/sub (§4.5). The teacher doesn't have an event bus to
//! imitate, so this is built from first principles on the same
//! `tokio::sync` primitives the rest of this codebase already depends on:
//! a per-subscriber bounded ring buffer guarded by a short `Mutex`, woken
//! with a `Notify`, rather than a single global `tokio::sync::broadcast`
//! (a global broadcast can't express "drop the oldest for this lagging
//! subscriber only" -- it drops for every receiver alike).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    User(Uuid),
    Resource(Uuid),
    /// Delivered to every subscriber regardless of their subscribed topics
    /// (used for operator-facing `alert` events from background loops).
    Broadcast,
}

struct Ring {
    buf: Mutex<VecDeque<Event>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self { buf: Mutex::new(VecDeque::with_capacity(capacity.min(64))), capacity, dropped: AtomicU64::new(0) }
    }

    fn push(&self, event: Event) {
        let mut buf = self.buf.lock().expect("event ring poisoned");
        if buf.len() >= self.capacity {
            buf.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buf.push_back(event);
    }

    fn pop_front(&self) -> Option<Event> {
        let mut buf = self.buf.lock().expect("event ring poisoned");
        buf.pop_front()
    }

    fn drain(&self) -> Vec<Event> {
        let mut buf = self.buf.lock().expect("event ring poisoned");
        buf.drain(..).collect()
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct Subscription {
    topics: Vec<Topic>,
    ring: Arc<Ring>,
}

/// A live subscriber handle. Poll with `recv` (or `try_recv` from a
/// non-async context) to drain queued events in FIFO order.
pub struct Subscriber {
    pub id: Uuid,
    ring: Arc<Ring>,
    notify: Arc<tokio::sync::Notify>,
}

impl Subscriber {
    pub async fn recv(&self) -> Event {
        loop {
            if let Some(event) = self.ring.pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.ring.dropped_count()
    }
}

/// The bus itself: subscriber registration under a short-lived `Mutex`;
/// publish is non-blocking and never waits on a subscriber.
pub struct Bus {
    subscribers: Mutex<HashMap<Uuid, Subscription>>,
    notify: Arc<tokio::sync::Notify>,
    buffer_size: usize,
}

impl Bus {
    pub fn new(buffer_size: usize) -> Self {
        Self { subscribers: Mutex::new(HashMap::new()), notify: Arc::new(tokio::sync::Notify::new()), buffer_size }
    }

    pub fn subscribe(&self, topics: Vec<Topic>) -> Subscriber {
        let id = Uuid::new_v4();
        let ring = Arc::new(Ring::new(self.buffer_size));
        self.subscribers.lock().expect("event bus poisoned").insert(id, Subscription { topics, ring: ring.clone() });
        Subscriber { id, ring, notify: self.notify.clone() }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.lock().expect("event bus poisoned").remove(&id);
    }

    /// Fan out `event` to every subscriber registered on `topic` (plus
    /// every subscriber, for `Topic::Broadcast`). Never blocks.
    pub fn publish(&self, topic: Topic, event_type: &str, data: serde_json::Value) {
        let event = Event { event_type: event_type.to_string(), timestamp: Utc::now(), data };
        let subs = self.subscribers.lock().expect("event bus poisoned");
        for sub in subs.values() {
            if matches!(topic, Topic::Broadcast) || sub.topics.contains(&topic) || sub.topics.contains(&Topic::Broadcast) {
                sub.ring.push(event.clone());
            }
        }
        drop(subs);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events_on_its_topic_only() {
        let bus = Bus::new(8);
        let user_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();
        let sub = bus.subscribe(vec![Topic::User(user_id)]);
        bus.publish(Topic::User(other_id), "reservation.created", serde_json::json!({}));
        bus.publish(Topic::User(user_id), "reservation.cancelled", serde_json::json!({}));
        let event = sub.recv().await;
        assert_eq!(event.event_type, "reservation.cancelled");
    }

    #[test]
    fn ring_drops_oldest_on_overflow() {
        let ring = Ring::new(2);
        for i in 0..4 {
            ring.push(Event { event_type: format!("e{i}"), timestamp: Utc::now(), data: serde_json::json!({}) });
        }
        let remaining = ring.drain();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].event_type, "e2");
        assert_eq!(ring.dropped_count(), 2);
    }
}
