//! In-process implementations of the feed cache port.

use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{Duration, Instant},
};

use tracing::warn;

use crate::application::cache::{FeedCache, FeedSnapshot};

const SOURCE: &str = "yatube::infra::cache";

struct Entry {
    value: FeedSnapshot,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Map-backed cache with lazy expiry.
#[derive(Default)]
pub struct MemoryFeedCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryFeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FeedCache for MemoryFeedCache {
    fn get(&self, key: &str) -> Option<FeedSnapshot> {
        let now = Instant::now();
        {
            let guard = rw_read(&self.entries, "get");
            match guard.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it unless a concurrent `set` already replaced it.
        let mut guard = rw_write(&self.entries, "get.expire");
        if guard.get(key).is_some_and(|entry| !entry.is_live(now)) {
            guard.remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: FeedSnapshot, ttl: Duration) {
        let now = Instant::now();
        // An unrepresentable deadline stores an already-expired entry.
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        rw_write(&self.entries, "set").insert(key.to_string(), Entry { value, expires_at });
    }

    fn clear(&self) {
        rw_write(&self.entries, "clear").clear();
    }
}

/// Cache that never holds anything. Used when the home-feed cache is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFeedCache;

impl FeedCache for NoopFeedCache {
    fn get(&self, _key: &str) -> Option<FeedSnapshot> {
        None
    }

    fn set(&self, _key: &str, _value: FeedSnapshot, _ttl: Duration) {}

    fn clear(&self) {}
}

fn rw_read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = SOURCE,
                lock_kind = "rwlock.read",
                result = "poisoned_recovered",
                "Recovered from poisoned cache lock"
            );
            poisoned.into_inner()
        }
    }
}

fn rw_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = SOURCE,
                lock_kind = "rwlock.write",
                result = "poisoned_recovered",
                "Recovered from poisoned cache lock"
            );
            poisoned.into_inner()
        }
    }
}
