//! HTTP transport for the dashboard API.
//!
//! [`Transport`] sends [`Request`]s with reqwest, attaches the session
//! credential, and classifies every failure into a [`SyncError`]:
//!
//! | Outcome | Error |
//! |---|---|
//! | no response | `Network` |
//! | request timeout elapsed | `Timeout` |
//! | 401 | `Unauthorized` (session expired if it carried the session token) |
//! | 404 | `NotFound` |
//! | other 4xx | `Validation` with field errors |
//! | 5xx | `Server` |
//!
//! Nothing is retried. The per-request timeout is the only cancellation.

pub mod request;

pub use request::{AuthMode, Body, Method, Request};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api::models::{Identity, Registration, TokenResponse};
use crate::session::{AuthApi, Credential, SessionStore};
use crate::telemetry;
use crate::{Result, SyncError};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// API root; request paths are appended to it.
    pub base_url: String,
    /// Upper bound on one request, connect to last body byte. Default: 30s.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            user_agent: crate::version::user_agent(),
        }
    }
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// HTTP client bound to one session.
#[derive(Clone)]
pub struct Transport {
    http: Client,
    config: TransportConfig,
    session: Arc<SessionStore>,
}

impl Transport {
    pub fn new(config: TransportConfig, session: Arc<SessionStore>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            session,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Send `request` and return the decoded JSON body (`Null` when empty).
    pub async fn send(&self, request: &Request) -> Result<serde_json::Value> {
        let method = request.method();
        let url = self.url(request.path());

        let credential = match request.auth() {
            AuthMode::Session => self.session.current_credential(),
            AuthMode::Public => None,
            AuthMode::Bearer(credential) => Some(credential.clone()),
        };

        let mut builder = self.http.request(method.to_reqwest(), &url);
        let pairs = request.query_pairs();
        if !pairs.is_empty() {
            builder = builder.query(&pairs);
        }
        if let Some(credential) = &credential {
            builder = builder.bearer_auth(credential.expose());
        }
        builder = match request.body() {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(fields) => builder.form(fields),
        };

        debug!(method = method.as_str(), path = request.path(), "sending request");
        let start = Instant::now();
        let after = self.config.request_timeout;
        let outcome = tokio::time::timeout(after, execute(builder))
            .await
            .unwrap_or_else(|_| Err(SyncError::Timeout { after }));
        let elapsed = start.elapsed();

        let status = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::counter!(
            telemetry::REQUESTS_TOTAL,
            "method" => method.as_str(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "method" => method.as_str())
            .record(elapsed.as_secs_f64());

        if let Err(e) = &outcome {
            debug!(
                method = method.as_str(),
                path = request.path(),
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "request failed"
            );
            if matches!(e, SyncError::Unauthorized)
                && *request.auth() == AuthMode::Session
                && let Some(credential) = &credential
                && self.session.expire(credential)
            {
                warn!(path = request.path(), "session credential rejected");
            }
        }
        outcome
    }

    /// Send `request` and deserialize the body into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        let value = self.send(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Create an account. Public; does not sign in.
    pub async fn register(&self, registration: &Registration) -> Result<Identity> {
        let request = Request::post("/auth/register").public().json(registration)?;
        self.send_json(&request).await
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

async fn execute(builder: reqwest::RequestBuilder) -> Result<serde_json::Value> {
    let response = builder
        .send()
        .await
        .map_err(|e| SyncError::Network(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SyncError::Network(e.to_string()))?;

    if !status.is_success() {
        return Err(SyncError::from_status(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl AuthApi for Transport {
    async fn request_token(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let request = Request::post("/auth/token")
            .public()
            .form([("username", username), ("password", password)]);
        self.send_json(&request).await
    }

    async fn fetch_identity(&self, credential: &Credential) -> Result<Identity> {
        let request = Request::get("/auth/me").bearer(credential.clone());
        self.send_json(&request).await
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.config.base_url)
            .field("request_timeout", &self.config.request_timeout)
            .finish_non_exhaustive()
    }
}
