//! Client context.
//!
//! [`SyncClient`] wires the session store, transport, query cache and
//! mutation coordinator of one application together. Every component lives
//! in the context; there is no global state, so tests and embedders can run
//! as many independent contexts as they like.

mod builder;

pub use builder::{ThreatSync, ThreatSyncBuilder};

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::Result;
use crate::api::Query;
use crate::api::models::{Identity, Registration};
use crate::cache::{CacheEntry, EntryStatus, KeyMatcher, QueryCache, ReadOptions, Subscription};
use crate::mutation::{Mutation, MutationCoordinator};
use crate::session::{Credential, ObserverHandle, Session, SessionState, SessionStore};
use crate::transport::{Request, Transport};

/// The data-sync context of one application.
///
/// Cheap to clone; clones share all state.
///
/// ```rust,no_run
/// use threatsync::{ThreatSync, api::queries};
///
/// #[tokio::main]
/// async fn main() -> threatsync::Result<()> {
///     let client = ThreatSync::builder()
///         .base_url("http://localhost:8000/api")
///         .build()?;
///
///     client.sign_in("analyst", "hunter22").await?;
///     let sources = client.fetch(&queries::sources()).await?;
///     println!("{} sources", sources.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SyncClient {
    session: Arc<SessionStore>,
    transport: Transport,
    cache: QueryCache<serde_json::Value>,
    mutations: MutationCoordinator<serde_json::Value>,
    _on_session_end: Option<Arc<ObserverHandle>>,
}

impl SyncClient {
    fn assemble(
        session: Arc<SessionStore>,
        transport: Transport,
        cache: QueryCache<serde_json::Value>,
        mutations: MutationCoordinator<serde_json::Value>,
        clear_cache_on_sign_out: bool,
    ) -> Self {
        let on_session_end = clear_cache_on_sign_out.then(|| {
            let cache = cache.clone();
            Arc::new(session.observe(move |event| {
                // Data fetched for the previous identity must not outlive it.
                let ended = event.previous == SessionState::Authenticated
                    && !event.current.is_authenticated();
                if ended {
                    let cleared = cache.clear();
                    debug!(cleared, reason = event.reason.as_str(), "session ended, cache cleared");
                }
            }))
        });
        Self {
            session,
            transport,
            cache,
            mutations,
            _on_session_end: on_session_end,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn cache(&self) -> &QueryCache<serde_json::Value> {
        &self.cache
    }

    pub fn mutations(&self) -> &MutationCoordinator<serde_json::Value> {
        &self.mutations
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current entry for `query`, scheduling a fetch when needed. Never waits
    /// for the network.
    pub fn read<T: DeserializeOwned>(&self, query: &Query<T>) -> CacheEntry<T> {
        self.read_with(query, self.cache.read_options())
    }

    pub fn read_with<T: DeserializeOwned>(
        &self,
        query: &Query<T>,
        options: ReadOptions,
    ) -> CacheEntry<T> {
        let entry = self.cache.read(
            query.key(),
            fetcher(&self.transport, query.request()),
            options,
        );
        decode_entry(query, entry)
    }

    /// Resolve `query` to fresh data, waiting for the network if needed.
    pub async fn fetch<T: DeserializeOwned>(&self, query: &Query<T>) -> Result<T> {
        self.fetch_with(query, self.cache.read_options()).await
    }

    pub async fn fetch_with<T: DeserializeOwned>(
        &self,
        query: &Query<T>,
        options: ReadOptions,
    ) -> Result<T> {
        let value = self
            .cache
            .fetch(query.key(), fetcher(&self.transport, query.request()), options)
            .await?;
        query.decode(&value)
    }

    /// Call `callback` with every state change of `query`'s entry.
    pub fn subscribe<T>(
        &self,
        query: &Query<T>,
        callback: impl Fn(&CacheEntry<T>) + Send + Sync + 'static,
    ) -> Subscription
    where
        T: DeserializeOwned + 'static,
    {
        let decoder = query.clone();
        self.cache.subscribe(query.key(), move |entry| {
            callback(&decode_entry(&decoder, entry.clone()));
        })
    }

    /// Stream of decoded snapshots for `query`. Dropping the stream
    /// unsubscribes.
    pub fn subscribe_stream<T>(&self, query: &Query<T>) -> impl Stream<Item = CacheEntry<T>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        let decoder = query.clone();
        self.cache
            .subscribe_stream(query.key())
            .map(move |entry| decode_entry(&decoder, entry))
    }

    /// Mark matching entries Stale.
    pub fn invalidate(&self, matcher: impl Into<KeyMatcher>) -> usize {
        self.cache.invalidate(matcher)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn mutate(&self, mutation: &Mutation) -> Result<serde_json::Value> {
        self.mutations.mutate(mutation).await
    }

    pub async fn mutate_as<T: DeserializeOwned>(&self, mutation: &Mutation) -> Result<T> {
        self.mutations.mutate_as(mutation).await
    }

    // ========================================================================
    // Session
    // ========================================================================

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session> {
        self.session
            .sign_in(&self.transport, username, password)
            .await
    }

    pub fn sign_out(&self) -> Result<()> {
        self.session.sign_out()
    }

    /// Resume a persisted session, if any.
    pub async fn restore(&self) -> Result<Session> {
        self.session.restore(&self.transport).await
    }

    pub fn current_credential(&self) -> Option<Credential> {
        self.session.current_credential()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.session.identity()
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, registration: &Registration) -> Result<Identity> {
        self.transport.register(registration).await
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("transport", &self.transport)
            .field("session", &self.session)
            .field("entries", &self.cache.len())
            .finish()
    }
}

/// Fetcher issuing `request` through `transport`.
fn fetcher(
    transport: &Transport,
    request: &Request,
) -> impl FnOnce() -> BoxFuture<'static, Result<serde_json::Value>> + Send + 'static + use<> {
    let transport = transport.clone();
    let request = request.clone();
    move || Box::pin(async move { transport.send(&request).await })
}

/// Decode a raw snapshot. A value that does not decode turns the snapshot
/// into an Error snapshot carrying the decode failure.
fn decode_entry<T: DeserializeOwned>(
    query: &Query<T>,
    entry: CacheEntry<serde_json::Value>,
) -> CacheEntry<T> {
    let decoded = entry.value.as_ref().map(|v| query.decode(v)).transpose();
    let (status, value, error) = match decoded {
        Ok(value) => (entry.status, value, entry.error),
        Err(e) => (EntryStatus::Error, None, Some(e)),
    };
    CacheEntry {
        key: entry.key,
        status,
        value,
        error,
        last_fetched_at: entry.last_fetched_at,
        subscriber_count: entry.subscriber_count,
        is_fetching: entry.is_fetching,
    }
}
