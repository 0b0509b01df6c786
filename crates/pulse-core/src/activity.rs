use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Activity feed length when a dashboard does not configure one.
pub const DEFAULT_LOG_CAPACITY: usize = 10;

/// Opaque event identifier, unique per generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

/// Visual weight of an activity entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emphasis {
    Success,
    #[default]
    Info,
    Warning,
}

/// A single feed entry. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    id: EventId,
    message: String,
    timestamp: DateTime<Utc>,
    emphasis: Emphasis,
}

impl ActivityEvent {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(id: EventId, message: impl Into<String>, emphasis: Emphasis) -> Self {
        Self::at(id, message, emphasis, Utc::now())
    }

    pub fn at(
        id: EventId,
        message: impl Into<String>,
        emphasis: Emphasis,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            message: message.into(),
            timestamp,
            emphasis,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn emphasis(&self) -> Emphasis {
        self.emphasis
    }
}

/// Newest-first ring buffer of activity events.
#[derive(Clone, Debug)]
pub struct ActivityLog {
    events: VecDeque<ActivityEvent>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl ActivityLog {
    /// A zero capacity would drop every event, so it is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("activity log capacity 0 raised to 1");
            1
        } else {
            capacity
        };
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend an event; returns the evicted oldest event when full.
    pub fn push(&mut self, event: ActivityEvent) -> Option<ActivityEvent> {
        self.events.push_front(event);
        if self.events.len() > self.capacity {
            self.events.pop_back()
        } else {
            None
        }
    }

    /// Current contents, most recent first. Each call reads fresh state.
    pub fn list(&self) -> Vec<ActivityEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityEvent> {
        self.events.iter()
    }

    pub fn latest(&self) -> Option<&ActivityEvent> {
        self.events.front()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
