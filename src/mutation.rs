//! Write operations and the cache invalidation they drive.
//!
//! A [`Mutation`] names the resource it writes; [`InvalidationRules`] maps
//! that resource to the cache key prefixes whose data it can change. After a
//! successful write the [`MutationCoordinator`] marks every matching entry
//! Stale so the next read refetches. A failed write invalidates nothing.

use std::collections::{BTreeSet, HashMap};

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::cache::{KeyMatcher, QueryCache};
use crate::telemetry;
use crate::transport::{Request, Transport};
use crate::Result;

/// A write against the API.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Operation name for logs and metrics, e.g. `"create_source"`.
    pub name: String,
    /// Resource the write affects; looked up in [`InvalidationRules`].
    pub resource: String,
    pub request: Request,
}

impl Mutation {
    pub fn new(name: impl Into<String>, resource: impl Into<String>, request: Request) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            request,
        }
    }
}

/// Mutation resource → cache key prefixes it invalidates.
#[derive(Debug, Clone, Default)]
pub struct InvalidationRules {
    rules: HashMap<String, BTreeSet<String>>,
}

impl InvalidationRules {
    /// No rules; every mutation invalidates nothing until registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rules for the dashboard API.
    ///
    /// - `source` → `sources`
    /// - `incident` → `incidents`, `dashboard`, `analytics`
    /// - `source.scrape` → nothing (scraping runs server-side later)
    pub fn dashboard() -> Self {
        Self::empty()
            .rule("source", ["sources"])
            .rule("incident", ["incidents", "dashboard", "analytics"])
            .rule("source.scrape", [] as [&str; 0])
    }

    /// Register (or extend) the prefixes invalidated by `resource`.
    pub fn rule<I, S>(mut self, resource: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules
            .entry(resource.into())
            .or_default()
            .extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Prefixes invalidated by `resource`. Unknown resources invalidate
    /// nothing.
    pub fn prefixes(&self, resource: &str) -> impl Iterator<Item = &str> {
        self.rules
            .get(resource)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.rules.contains_key(resource)
    }
}

/// Executes mutations and invalidates affected cache entries.
#[derive(Clone)]
pub struct MutationCoordinator<V> {
    transport: Transport,
    cache: QueryCache<V>,
    rules: InvalidationRules,
}

impl<V> MutationCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(transport: Transport, cache: QueryCache<V>, rules: InvalidationRules) -> Self {
        Self {
            transport,
            cache,
            rules,
        }
    }

    pub fn rules(&self) -> &InvalidationRules {
        &self.rules
    }

    /// Send the write; on success invalidate the registered prefixes and
    /// return the response body. Errors come back unmodified.
    pub async fn mutate(&self, mutation: &Mutation) -> Result<serde_json::Value> {
        debug!(mutation = %mutation.name, resource = %mutation.resource, "executing mutation");
        let outcome = self.transport.send(&mutation.request).await;

        let status = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::counter!(
            telemetry::MUTATIONS_TOTAL,
            "mutation" => mutation.name.clone(),
            "status" => status
        )
        .increment(1);

        let response = outcome?;
        let invalidated: usize = self
            .rules
            .prefixes(&mutation.resource)
            .map(|prefix| self.cache.invalidate(KeyMatcher::prefix(prefix)))
            .sum();
        info!(mutation = %mutation.name, invalidated, "mutation applied");
        Ok(response)
    }

    /// [`mutate`](Self::mutate) and deserialize the response into `T`.
    ///
    /// Invalidation happens before decoding, so a response that fails to
    /// decode still leaves the cache consistent with the server.
    pub async fn mutate_as<T: DeserializeOwned>(&self, mutation: &Mutation) -> Result<T> {
        let value = self.mutate(mutation).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<V> std::fmt::Debug for MutationCoordinator<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}
