//! Structured per-query event log.
//!
//! Single-writer, multiple-reader diagnostics channel. Events are held in
//! a bounded ring (oldest evicted) and every append hands subscribers a
//! snapshot of the current buffer. Consumers render or persist the
//! snapshots; the engine only writes.

use crate::types::current_timestamp_ms;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Maximum retained events.
pub const EVENT_CAPACITY: usize = 500;

/// Pipeline stage markers recorded per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Query accepted, retriever resolution begins
    QueryStart,
    /// Ranked chunks produced
    RetrievalComplete,
    /// Citations joined to documents
    ContextBuilt,
    /// Chat-mode answer produced
    GenerationComplete,
    /// One post-processor finished
    PolishComplete,
    /// Query finished, result returned
    QueryComplete,
    /// A stage failed (best-effort stages continue, fatal stages abort)
    Error,
}

/// One recorded event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Monotonic event id
    pub id: u64,
    /// Wall-clock timestamp (Unix ms) from a single clock source
    pub timestamp_ms: u64,
    /// Stage marker
    pub kind: EventKind,
    /// Stage-specific payload
    pub data: serde_json::Value,
    /// Stage duration, when the stage is timed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

type Subscriber = Box<dyn Fn(&[Event]) + Send + Sync>;

#[derive(Default)]
struct EventBuffer {
    events: VecDeque<Event>,
    next_id: u64,
}

/// Bounded, observable event log.
#[derive(Clone, Default)]
pub struct EventLog {
    buffer: Arc<RwLock<EventBuffer>>,
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and notifies subscribers with a buffer snapshot.
    pub fn record(&self, kind: EventKind, data: serde_json::Value, duration_ms: Option<u64>) {
        let snapshot = {
            let Ok(mut buffer) = self.buffer.write() else {
                return;
            };
            let event = Event {
                id: buffer.next_id,
                timestamp_ms: current_timestamp_ms(),
                kind,
                data,
                duration_ms,
            };
            buffer.next_id += 1;
            if buffer.events.len() == EVENT_CAPACITY {
                buffer.events.pop_front();
            }
            buffer.events.push_back(event);
            buffer.events.iter().cloned().collect::<Vec<_>>()
        };

        if let Ok(subscribers) = self.subscribers.read() {
            for subscriber in subscribers.iter() {
                subscriber(&snapshot);
            }
        }
    }

    /// Registers a subscriber; it receives a snapshot on every append.
    pub fn subscribe(&self, subscriber: impl Fn(&[Event]) + Send + Sync + 'static) {
        if let Ok(mut subscribers) = self.subscribers.write() {
            subscribers.push(Box::new(subscriber));
        }
    }

    /// Current buffer contents, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.buffer
            .read()
            .map(|buffer| buffer.events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.buffer.read().map(|b| b.events.len()).unwrap_or(0)
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all events.
    pub fn clear(&self) {
        if let Ok(mut buffer) = self.buffer.write() {
            buffer.events.clear();
        }
    }
}
