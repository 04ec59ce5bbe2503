//! Authenticated session state.
//!
//! [`SessionStore`] holds the one [`Session`] of a client context: the
//! credential token, the identity it resolves to, and the lifecycle state.
//!
//! ```text
//!                 sign_in / restore
//! Unauthenticated ─────────────────► Authenticating
//!       ▲   ▲                             │
//!       │   └──── failure / sign_out ─────┤
//!       │                                 │ token + identity ok
//!       └── sign_out / expire ◄── Authenticated
//! ```
//!
//! A credential is present exactly when the state is `Authenticated`.
//! Attempts are generation-stamped: a sign-out or a newer sign-in while an
//! attempt is awaiting the network supersedes it, and the superseded attempt
//! never persists or commits anything.

pub mod credential;

pub use credential::{
    Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    default_credential_path,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::models::{Identity, TokenResponse};
use crate::telemetry;
use crate::{Result, SyncError};

/// Authentication endpoints the session store drives.
///
/// Implemented by [`Transport`](crate::Transport); tests substitute their own.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange username and password for a token. Sends no credential.
    async fn request_token(&self, username: &str, password: &str) -> Result<TokenResponse>;

    /// Resolve the identity behind `credential`.
    ///
    /// A 401 here must not feed back into [`SessionStore::expire`]; the
    /// store handles the failure itself.
    async fn fetch_identity(&self, credential: &Credential) -> Result<Identity>;
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the session changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionReason {
    SignInStarted,
    SignedIn,
    SignInFailed,
    SignedOut,
    /// The API rejected the current credential.
    Expired,
    RestoreStarted,
    Restored,
    RestoreFailed,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::SignInStarted => "sign_in_started",
            TransitionReason::SignedIn => "signed_in",
            TransitionReason::SignInFailed => "sign_in_failed",
            TransitionReason::SignedOut => "signed_out",
            TransitionReason::Expired => "expired",
            TransitionReason::RestoreStarted => "restore_started",
            TransitionReason::Restored => "restored",
            TransitionReason::RestoreFailed => "restore_failed",
        }
    }
}

/// Snapshot of the session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    credential: Option<Credential>,
    identity: Option<Identity>,
    state: SessionState,
}

impl Session {
    fn authenticating() -> Self {
        Self {
            state: SessionState::Authenticating,
            ..Self::default()
        }
    }

    fn authenticated(credential: Credential, identity: Identity) -> Self {
        Self {
            credential: Some(credential),
            identity: Some(identity),
            state: SessionState::Authenticated,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }
}

/// A state change delivered to observers.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub previous: SessionState,
    pub current: Session,
    pub reason: TransitionReason,
}

type Observer = Arc<dyn Fn(&SessionEvent) + Send + Sync>;
type Observers = Mutex<Vec<(u64, Observer)>>;

/// Registration of a session observer. Dropping it removes the observer.
#[must_use = "dropping an ObserverHandle removes the observer immediately"]
pub struct ObserverHandle {
    id: u64,
    observers: Weak<Observers>,
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle").field("id", &self.id).finish()
    }
}

struct State {
    session: Session,
    /// Bumped by every attempt start, sign-out and expiry.
    generation: u64,
}

/// Owner of the session for one client context.
pub struct SessionStore {
    state: Mutex<State>,
    store: Arc<dyn CredentialStore>,
    observers: Arc<Observers>,
    next_observer: AtomicU64,
    watch: watch::Sender<SessionState>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (watch, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            state: Mutex::new(State {
                session: Session::default(),
                generation: 0,
            }),
            store,
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer: AtomicU64::new(0),
            watch,
        }
    }

    /// Store backed by [`MemoryCredentialStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::new()))
    }

    pub fn session(&self) -> Session {
        self.lock().session.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().session.state
    }

    pub fn current_credential(&self) -> Option<Credential> {
        self.lock().session.credential.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.lock().session.identity.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// Sign in with username and password.
    ///
    /// The token is persisted before the identity is fetched; if the
    /// identity lookup fails the token is cleared again and the session ends
    /// Unauthenticated. A 401 from the token endpoint becomes
    /// [`SyncError::InvalidCredentials`].
    pub async fn sign_in(
        &self,
        auth: &dyn AuthApi,
        username: &str,
        password: &str,
    ) -> Result<Session> {
        let generation = self.begin_sign_in()?;
        info!(username, "signing in");

        let token = match auth.request_token(username, password).await {
            Ok(token) => token,
            Err(e) => {
                let e = match e {
                    SyncError::Unauthorized => SyncError::InvalidCredentials,
                    other => other,
                };
                warn!(username, error = %e, "sign-in rejected");
                self.abandon(generation, TransitionReason::SignInFailed);
                return Err(e);
            }
        };
        let credential = Credential::new(token.access_token);

        {
            let mut state = self.lock();
            if state.generation != generation {
                return Err(SyncError::SessionSuperseded);
            }
            if let Err(e) = self.store.save(&credential) {
                let event = self.transition(
                    &mut state,
                    Session::default(),
                    TransitionReason::SignInFailed,
                );
                drop(state);
                self.notify(event);
                return Err(e);
            }
        }

        let identity = match auth.fetch_identity(&credential).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(username, error = %e, "identity lookup failed after sign-in");
                self.abandon(generation, TransitionReason::SignInFailed);
                return Err(e);
            }
        };

        let session = Session::authenticated(credential, identity);
        self.commit(generation, session.clone(), TransitionReason::SignedIn)?;
        info!(username, "signed in");
        Ok(session)
    }

    /// Clear the credential and identity.
    ///
    /// Idempotent; observers only hear about it when the state actually
    /// changes. In-memory state is cleared even if the persisted credential
    /// cannot be removed, in which case the storage error is returned.
    pub fn sign_out(&self) -> Result<()> {
        let (event, cleared) = {
            let mut state = self.lock();
            state.generation += 1;
            let cleared = self.store.clear();
            let event =
                self.transition(&mut state, Session::default(), TransitionReason::SignedOut);
            (event, cleared)
        };
        if event.is_some() {
            info!("signed out");
        }
        self.notify(event);
        cleared
    }

    /// Resume a session from the persisted credential, if any.
    ///
    /// With nothing persisted, or when already signed in, this is a no-op
    /// returning the current session. If the identity lookup fails the
    /// credential is cleared and the error is returned.
    pub async fn restore(&self, auth: &dyn AuthApi) -> Result<Session> {
        let (generation, credential, event) = {
            let mut state = self.lock();
            if state.session.is_authenticated() {
                debug!("session already authenticated, nothing to restore");
                return Ok(state.session.clone());
            }
            let Some(credential) = self.store.load()? else {
                debug!("no persisted credential to restore");
                return Ok(state.session.clone());
            };
            state.generation += 1;
            let generation = state.generation;
            let event = self.transition(
                &mut state,
                Session::authenticating(),
                TransitionReason::RestoreStarted,
            );
            (generation, credential, event)
        };
        self.notify(event);

        match auth.fetch_identity(&credential).await {
            Ok(identity) => {
                let session = Session::authenticated(credential, identity);
                self.commit(generation, session.clone(), TransitionReason::Restored)?;
                info!("restored session");
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "persisted credential rejected, clearing it");
                self.abandon(generation, TransitionReason::RestoreFailed);
                Err(e)
            }
        }
    }

    /// React to the API rejecting `credential`.
    ///
    /// Signs out only if `credential` is still the current one, so any
    /// number of concurrent rejections of the same token produce a single
    /// transition. Returns whether this call signed the session out.
    pub fn expire(&self, credential: &Credential) -> bool {
        let event = {
            let mut state = self.lock();
            if state.session.credential.as_ref() != Some(credential) {
                return false;
            }
            state.generation += 1;
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "failed to clear persisted credential");
            }
            self.transition(&mut state, Session::default(), TransitionReason::Expired)
        };
        warn!("credential rejected by the API, session expired");
        self.notify(event);
        true
    }

    /// Register `callback` for every state transition.
    pub fn observe(
        &self,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> ObserverHandle {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        ObserverHandle {
            id,
            observers: Arc::downgrade(&self.observers),
        }
    }

    /// Receiver that always holds the latest state.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.watch.subscribe()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a sign-in attempt: supersede whatever runs, drop the previous
    /// credential, move to Authenticating.
    fn begin_sign_in(&self) -> Result<u64> {
        let (generation, event, cleared) = {
            let mut state = self.lock();
            state.generation += 1;
            let cleared = self.store.clear();
            let next = if cleared.is_ok() {
                Session::authenticating()
            } else {
                Session::default()
            };
            let reason = if cleared.is_ok() {
                TransitionReason::SignInStarted
            } else {
                TransitionReason::SignInFailed
            };
            let event = self.transition(&mut state, next, reason);
            (state.generation, event, cleared)
        };
        self.notify(event);
        cleared.map(|()| generation)
    }

    /// Roll back attempt `generation` unless something newer took over.
    fn abandon(&self, generation: u64, reason: TransitionReason) {
        let event = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "failed to clear persisted credential");
            }
            self.transition(&mut state, Session::default(), reason)
        };
        self.notify(event);
    }

    fn commit(&self, generation: u64, session: Session, reason: TransitionReason) -> Result<()> {
        let event = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(reason = reason.as_str(), "session attempt superseded");
                return Err(SyncError::SessionSuperseded);
            }
            self.transition(&mut state, session, reason)
        };
        self.notify(event);
        Ok(())
    }

    /// Replace the session under the lock. Returns the event to deliver once
    /// the lock is released, if the state changed.
    fn transition(
        &self,
        state: &mut State,
        next: Session,
        reason: TransitionReason,
    ) -> Option<SessionEvent> {
        let previous = state.session.state;
        state.session = next;
        let current = state.session.state;
        self.watch.send_replace(current);
        if previous == current {
            return None;
        }
        metrics::counter!(telemetry::SESSION_TRANSITIONS_TOTAL, "reason" => reason.as_str())
            .increment(1);
        debug!(
            from = previous.as_str(),
            to = current.as_str(),
            reason = reason.as_str(),
            "session transition"
        );
        Some(SessionEvent {
            previous,
            current: state.session.clone(),
            reason,
        })
    }

    fn notify(&self, event: Option<SessionEvent>) {
        let Some(event) = event else {
            return;
        };
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for observer in observers {
            observer(&event);
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
