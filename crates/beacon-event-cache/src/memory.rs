//! Process-memory event cache.

use crate::{Event, EventCache, Fingerprint};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// [`EventCache`] kept in process memory.
///
/// Same deduplication, attempts ceiling and sampling rules as
/// [`SqliteEventCache`](crate::SqliteEventCache), without surviving a restart.
pub struct MemoryEventCache {
    entries: Mutex<Option<HashMap<Fingerprint, u32>>>,
}

impl MemoryEventCache {
    /// Create an empty, ready cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Attempts recorded for the event, `None` if it is not cached.
    pub fn attempts(&self, event: &Event) -> Option<u32> {
        let guard = self.entries.lock();
        guard.as_ref()?.get(&Fingerprint::of(event)).copied()
    }
}

impl Default for MemoryEventCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCache for MemoryEventCache {
    fn write(&self, event: &Event) -> bool {
        let mut guard = self.entries.lock();
        let Some(entries) = guard.as_mut() else {
            return false;
        };
        *entries.entry(Fingerprint::of(event)).or_insert(0) += 1;
        true
    }

    fn remove(&self, event: &Event) -> bool {
        let mut guard = self.entries.lock();
        guard
            .as_mut()
            .is_some_and(|entries| entries.remove(&Fingerprint::of(event)).is_some())
    }

    fn exists(&self, event: &Event) -> bool {
        let guard = self.entries.lock();
        guard
            .as_ref()
            .is_some_and(|entries| entries.contains_key(&Fingerprint::of(event)))
    }

    fn read(&self, count: usize, max_attempts: u32) -> Vec<Event> {
        let guard = self.entries.lock();
        let Some(entries) = guard.as_ref() else {
            return Vec::new();
        };

        let eligible: Vec<&Fingerprint> = entries
            .iter()
            .filter(|(_, attempts)| max_attempts == 0 || **attempts < max_attempts)
            .map(|(key, _)| key)
            .collect();

        eligible
            .choose_multiple(&mut rand::thread_rng(), count)
            .filter_map(|key| key.to_event())
            .collect()
    }

    fn ready(&self) -> bool {
        self.entries.lock().is_some()
    }

    fn close(&self) {
        self.entries.lock().take();
    }

    fn pending_count(&self) -> usize {
        self.entries.lock().as_ref().map_or(0, HashMap::len)
    }
}
