//! Telemetry metric name constants.
//!
//! Centralised metric names for threatsync operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `threatsync_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `resource` — first path segment of the cache key (e.g. "incidents" for
//!   both the listing and `incidents/{id}`)
//! - `method` — HTTP method
//! - `status` — outcome: "ok" or an error label (see `SyncError::label`)

/// Reads served from a Fresh entry without any network call.
///
/// Labels: `resource`.
pub const CACHE_HITS_TOTAL: &str = "threatsync_cache_hits_total";

/// Reads served from a Stale (or expired) entry while a refetch runs.
///
/// Labels: `resource`.
pub const CACHE_STALE_HITS_TOTAL: &str = "threatsync_cache_stale_hits_total";

/// Reads for a key with no usable entry.
///
/// Labels: `resource`.
pub const CACHE_MISSES_TOTAL: &str = "threatsync_cache_misses_total";

/// Fetches actually issued by the cache engine.
///
/// Labels: `resource`.
pub const FETCHES_TOTAL: &str = "threatsync_fetches_total";

/// Reads that attached to an already in-flight fetch.
///
/// Labels: `resource`.
pub const DEDUPLICATED_TOTAL: &str = "threatsync_deduplicated_total";

/// Responses dropped because a newer response had already been applied.
///
/// Labels: `resource`.
pub const DISCARDED_RESPONSES_TOTAL: &str = "threatsync_discarded_responses_total";

/// Entries marked Stale by invalidation.
pub const INVALIDATIONS_TOTAL: &str = "threatsync_invalidations_total";

/// Entries evicted by garbage collection.
pub const EVICTIONS_TOTAL: &str = "threatsync_evictions_total";

/// HTTP requests sent by the transport.
///
/// Labels: `method`, `status`.
pub const REQUESTS_TOTAL: &str = "threatsync_requests_total";

/// HTTP request duration in seconds.
///
/// Labels: `method`.
pub const REQUEST_DURATION_SECONDS: &str = "threatsync_request_duration_seconds";

/// Mutations executed.
///
/// Labels: `mutation`, `status`.
pub const MUTATIONS_TOTAL: &str = "threatsync_mutations_total";

/// Session state transitions.
///
/// Labels: `reason`.
pub const SESSION_TRANSITIONS_TOTAL: &str = "threatsync_session_transitions_total";
