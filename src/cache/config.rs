//! Query cache configuration.

use std::time::Duration;

/// Engine-wide configuration for the [`QueryCache`](super::QueryCache).
///
/// ```rust
/// # use threatsync::QueryConfig;
/// # use std::time::Duration;
/// let config = QueryConfig::new()
///     .freshness_window(Duration::from_secs(10))
///     .gc_grace(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long a fetched value counts as Fresh. Default: 30s.
    pub freshness_window: Duration,
    /// How long an entry with no subscribers survives before eviction.
    /// Default: 5 minutes.
    pub gc_grace: Duration,
    /// Upper bound on a single fetch. `None` leaves timing to the fetcher
    /// (the transport applies its own request timeout). Default: `None`.
    pub fetch_timeout: Option<Duration>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(30),
            gc_grace: Duration::from_secs(300),
            fetch_timeout: None,
        }
    }
}

impl QueryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn gc_grace(mut self, grace: Duration) -> Self {
        self.gc_grace = grace;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Default read options derived from this config.
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            freshness_window: self.freshness_window,
        }
    }
}

/// Per-read options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Age after which a Fresh entry is treated as Stale for this read.
    pub freshness_window: Duration,
}

impl ReadOptions {
    pub fn freshness_window(window: Duration) -> Self {
        Self {
            freshness_window: window,
        }
    }

    /// Options that treat any cached value as expired, forcing a refetch.
    pub fn always_refetch() -> Self {
        Self::freshness_window(Duration::ZERO)
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        QueryConfig::default().read_options()
    }
}
