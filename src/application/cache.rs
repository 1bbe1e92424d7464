//! Port for the home-feed snapshot cache.

use std::{sync::Arc, time::Duration};

use crate::domain::entities::PostRecord;

/// Fixed key under which the full home feed is stored.
pub const INDEX_PAGE_KEY: &str = "index_page";

pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(20);

/// Every post, newest first, as it was when the snapshot was taken.
pub type FeedSnapshot = Arc<[PostRecord]>;

/// Key/value cache with per-entry expiry.
///
/// Entries are only ever removed by expiry or `clear`; writes to posts do not
/// invalidate anything. Concurrent `set` calls for the same key race and the
/// last one wins.
pub trait FeedCache: Send + Sync {
    /// Unexpired value for `key`, if any.
    fn get(&self, key: &str) -> Option<FeedSnapshot>;

    fn set(&self, key: &str, value: FeedSnapshot, ttl: Duration);

    fn clear(&self);
}
