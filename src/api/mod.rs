//! Typed catalog of the dashboard API.
//!
//! [`queries`] builds cacheable reads ([`Query`]), [`mutations`] builds
//! writes ([`Mutation`](crate::Mutation)). Both are plain descriptors; the
//! [`SyncClient`](crate::SyncClient) executes them.

pub mod models;
pub mod mutations;
pub mod queries;

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::cache::CacheKey;
use crate::transport::Request;
use crate::Result;

/// A GET request whose response decodes into `T`.
///
/// The cache key is derived from the request, so two queries for the same
/// path and parameters share one cache entry and one in-flight fetch.
pub struct Query<T> {
    request: Request,
    key: CacheKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Query<T> {
    pub fn new(request: Request) -> Self {
        let key = request.cache_key();
        Self {
            request,
            key,
            _marker: PhantomData,
        }
    }

    /// Decode a cached response body.
    pub fn decode(&self, value: &serde_json::Value) -> Result<T> {
        Ok(T::deserialize(value)?)
    }
}

impl<T> Query<T> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("key", &self.key).finish()
    }
}
