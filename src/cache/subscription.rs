//! Subscription handles for cache entries.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::entry::CacheEntry;
use super::key::CacheKey;

/// Registration of a callback on one cache key.
///
/// Dropping the handle unsubscribes. When the last subscription of an entry
/// goes away the entry becomes eligible for garbage collection after the
/// configured grace period.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    key: CacheKey,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(super) fn new(key: CacheKey, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            key,
            release: Some(Box::new(release)),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Unsubscribe explicitly. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.release.is_some())
            .finish()
    }
}

pin_project! {
    /// Stream of entry snapshots for one key.
    ///
    /// Yields the current snapshot first (when the entry exists), then one
    /// snapshot per state change. Owns its [`Subscription`]; dropping the
    /// stream unsubscribes.
    pub struct EntryStream<V> {
        #[pin]
        inner: UnboundedReceiverStream<CacheEntry<V>>,
        subscription: Subscription,
    }
}

impl<V> EntryStream<V> {
    pub(super) fn new(
        inner: UnboundedReceiverStream<CacheEntry<V>>,
        subscription: Subscription,
    ) -> Self {
        Self {
            inner,
            subscription,
        }
    }

    pub fn key(&self) -> &CacheKey {
        self.subscription.key()
    }
}

impl<V> Stream for EntryStream<V> {
    type Item = CacheEntry<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}
