//! Read-only cache entry snapshots.

use std::time::Duration;

use tokio::time::Instant;

use super::key::CacheKey;
use crate::SyncError;

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// A fetch is in flight and no newer outcome has been applied.
    Pending,
    /// The value came from the latest applied fetch and has not been
    /// invalidated.
    Fresh,
    /// The value is servable but outdated; the next read refetches.
    Stale,
    /// The latest applied fetch failed.
    Error,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Fresh => "fresh",
            EntryStatus::Stale => "stale",
            EntryStatus::Error => "error",
        }
    }
}

/// Snapshot of a cache entry, as handed to readers and subscribers.
///
/// The engine owns the live entry; snapshots are clones and never change
/// after they are taken.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub status: EntryStatus,
    /// Last successfully fetched value. Kept across Stale, Pending and Error
    /// so consumers can keep rendering it.
    pub value: Option<V>,
    /// Failure of the latest applied fetch; only set when `status` is Error.
    pub error: Option<SyncError>,
    pub last_fetched_at: Option<Instant>,
    pub subscriber_count: usize,
    /// Whether a fetch for this key is currently in flight.
    pub is_fetching: bool,
}

impl<V> CacheEntry<V> {
    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }

    pub fn is_fresh(&self) -> bool {
        self.status == EntryStatus::Fresh
    }

    pub fn is_stale(&self) -> bool {
        self.status == EntryStatus::Stale
    }

    pub fn is_error(&self) -> bool {
        self.status == EntryStatus::Error
    }

    /// Time since the value was last fetched, if ever.
    pub fn age(&self) -> Option<Duration> {
        self.last_fetched_at.map(|t| t.elapsed())
    }

    /// Transform the value, keeping the rest of the snapshot.
    pub fn map_value<U>(self, f: impl FnOnce(V) -> U) -> CacheEntry<U> {
        CacheEntry {
            key: self.key,
            status: self.status,
            value: self.value.map(f),
            error: self.error,
            last_fetched_at: self.last_fetched_at,
            subscriber_count: self.subscriber_count,
            is_fetching: self.is_fetching,
        }
    }
}
