//! Builder for configuring client contexts

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::SyncClient;
use crate::Result;
use crate::cache::{QueryCache, QueryConfig};
use crate::config::Config;
use crate::mutation::{InvalidationRules, MutationCoordinator};
use crate::session::{CredentialStore, FileCredentialStore, MemoryCredentialStore, SessionStore};
use crate::transport::{Transport, TransportConfig};

/// Main entry point for creating client contexts.
pub struct ThreatSync;

impl ThreatSync {
    /// Create a new builder for configuring the client.
    pub fn builder() -> ThreatSyncBuilder {
        ThreatSyncBuilder::new()
    }
}

/// Builder for [`SyncClient`].
///
/// Defaults: local API root, in-memory credentials, dashboard invalidation
/// rules, and a cache that is cleared whenever the session ends.
pub struct ThreatSyncBuilder {
    transport: TransportConfig,
    query: QueryConfig,
    credential_store: Option<Arc<dyn CredentialStore>>,
    rules: InvalidationRules,
    clear_cache_on_sign_out: bool,
}

impl ThreatSyncBuilder {
    pub fn new() -> Self {
        Self {
            transport: TransportConfig::default(),
            query: QueryConfig::default(),
            credential_store: None,
            rules: InvalidationRules::dashboard(),
            clear_cache_on_sign_out: true,
        }
    }

    /// Start from a loaded [`Config`], persisting credentials to its
    /// configured path.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .transport_config(config.transport_config())
            .query_config(config.query_config())
            .credential_file(config.credential_path())
    }

    /// API root; request paths are appended to it.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.transport.base_url = url.into();
        self
    }

    /// Per-request timeout (default: 30s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.transport.request_timeout = timeout;
        self
    }

    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }

    pub fn query_config(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// Persist credentials to `path`.
    pub fn credential_file(self, path: impl Into<PathBuf>) -> Self {
        self.credential_store(Arc::new(FileCredentialStore::new(path)))
    }

    pub fn invalidation_rules(mut self, rules: InvalidationRules) -> Self {
        self.rules = rules;
        self
    }

    /// Whether ending the session drops every cached entry (default: true).
    pub fn clear_cache_on_sign_out(mut self, clear: bool) -> Self {
        self.clear_cache_on_sign_out = clear;
        self
    }

    pub fn build(self) -> Result<SyncClient> {
        let store = self
            .credential_store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let session = Arc::new(SessionStore::new(store));
        let transport = Transport::new(self.transport, session.clone())?;
        let cache = QueryCache::new(self.query);
        let mutations = MutationCoordinator::new(transport.clone(), cache.clone(), self.rules);
        Ok(SyncClient::assemble(
            session,
            transport,
            cache,
            mutations,
            self.clear_cache_on_sign_out,
        ))
    }
}

impl Default for ThreatSyncBuilder {
    fn default() -> Self {
        Self::new()
    }
}
