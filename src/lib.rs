//! threatsync - Client-side data sync for the threat dashboard API
//!
//! This crate keeps a consumer's view of the dashboard API consistent: reads
//! go through a keyed [`QueryCache`] with staleness tracking, request
//! deduplication and subscriptions; writes go through a
//! [`MutationCoordinator`] that invalidates exactly the cached data they can
//! affect; and every request carries the credential of one authenticated
//! [`SessionStore`].
//!
//! # Example
//!
//! ```rust,no_run
//! use threatsync::{ThreatSync, api::{models::IncidentQuery, mutations, queries}};
//! use threatsync::api::models::{SourceCreate, SourceType};
//!
//! #[tokio::main]
//! async fn main() -> threatsync::Result<()> {
//!     let client = ThreatSync::builder()
//!         .base_url("http://localhost:8000/api")
//!         .build()?;
//!
//!     client.sign_in("analyst", "hunter22").await?;
//!
//!     // Cached, deduplicated read.
//!     let page = client.fetch(&queries::incidents(&IncidentQuery::new())).await?;
//!     println!("{} incidents", page.total);
//!
//!     // Write; every cached `sources*` entry goes stale.
//!     let feed = SourceCreate::new("Feed A", "https://feeds.example/a", SourceType::SecurityFeed);
//!     client.mutate(&mutations::create_source(&feed)?).await?;
//!
//!     // Served from the network again, not from the stale entry.
//!     let sources = client.fetch(&queries::sources()).await?;
//!     println!("{} sources", sources.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mutation;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod version;

// Re-export main types at crate root
pub use cache::{
    CacheEntry, CacheKey, EntryStatus, EntryStream, KeyMatcher, ParamValue, QueryCache,
    QueryConfig, ReadOptions, Subscription,
};
pub use client::{SyncClient, ThreatSync, ThreatSyncBuilder};
pub use config::Config;
pub use error::{FieldError, Result, SyncError};
pub use mutation::{InvalidationRules, Mutation, MutationCoordinator};
pub use session::{
    AuthApi, Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    ObserverHandle, Session, SessionEvent, SessionState, SessionStore, TransitionReason,
};
pub use transport::{AuthMode, Body, Method, Request, Transport, TransportConfig};
