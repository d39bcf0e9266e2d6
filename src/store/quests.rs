//! Quest progress counters

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;

/// Progress events reported by battles
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuestEvent {
    /// Picked up a bonus box of the given kind key
    TakeBonus(String),
    KillEnemy,
    DeliverFlag,
}

pub trait QuestTracker: Send + Sync + Debug {
    fn record(&self, username: &str, event: QuestEvent);
}

#[derive(Debug, Default)]
pub struct InMemoryQuestTracker {
    progress: Mutex<HashMap<(String, QuestEvent), u32>>,
}

impl InMemoryQuestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self, username: &str, event: &QuestEvent) -> u32 {
        self.progress
            .lock()
            .get(&(username.to_string(), event.clone()))
            .copied()
            .unwrap_or(0)
    }
}

impl QuestTracker for InMemoryQuestTracker {
    fn record(&self, username: &str, event: QuestEvent) {
        *self
            .progress
            .lock()
            .entry((username.to_string(), event))
            .or_insert(0) += 1;
    }
}
