//! Auth lifecycle machine.
//!
//! Owns every session transition: startup re-authentication, login,
//! registration, refresh, permission reload, logout and teardown. The
//! machine is an explicitly constructed value; share it behind an `Arc`.
//!
//! Network calls never run while a synchronous lock is held. Each request
//! captures the store [`Epoch`] it was issued under, and its result is only
//! applied if that epoch is still current.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use learnhub_auth::{Identity, Role, access_token_expired};

use crate::backend::{AuthBackend, BackendError, Credentials, RegistrationPayload};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{SessionError, SwitchError};
use crate::guard::ResumeTarget;
use crate::status::SessionStatus;
use crate::storage::TokenStorage;
use crate::store::{Epoch, SessionStore, SessionView, TransitionGuard};
use crate::switch::SwitchSlot;

/// Mutable bookkeeping that sits next to the store.
#[derive(Debug, Default)]
pub(crate) struct MachineState {
    pub(crate) switch: SwitchSlot,
    pub(crate) last_error: Option<SessionError>,
    pub(crate) resume: Option<ResumeTarget>,
}

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Arc<Identity>,
    /// Route the user was sent away from before signing in, if any.
    pub resume: Option<ResumeTarget>,
}

#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    /// The backend allowed auto-login; a session is established.
    SignedIn(LoginOutcome),
    /// Account created; the user still has to sign in.
    Registered { message: String },
}

const REGISTERED_MESSAGE: &str = "Registration complete. Sign in to continue.";

pub struct AuthMachine {
    backend: Arc<dyn AuthBackend>,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    state: Mutex<MachineState>,
}

impl core::fmt::Debug for AuthMachine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthMachine")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuthMachine {
    pub fn new(config: SessionConfig, backend: Arc<dyn AuthBackend>, storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            backend,
            store: SessionStore::new(storage),
            clock: Arc::new(SystemClock),
            config,
            state: Mutex::new(MachineState::default()),
        }
    }

    /// Build a machine whose storage comes from `config`.
    pub fn from_config(config: SessionConfig, backend: Arc<dyn AuthBackend>) -> anyhow::Result<Self> {
        let storage = config.open_storage()?;
        Ok(Self::new(config, backend, storage))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, MachineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn store(&self) -> &SessionStore {
        &self.store
    }

    pub(crate) fn backend(&self) -> &dyn AuthBackend {
        self.backend.as_ref()
    }

    pub fn view(&self) -> SessionView {
        self.store.view()
    }

    pub fn status(&self) -> SessionStatus {
        self.store.status()
    }

    pub fn identity(&self) -> Option<Arc<Identity>> {
        self.store.identity()
    }

    pub fn epoch(&self) -> Epoch {
        self.store.epoch()
    }

    /// Most recent user-visible lifecycle error.
    pub fn last_error(&self) -> Option<SessionError> {
        self.lock_state().last_error.clone()
    }

    /// Most recent role-switch failure, cleared by the next success.
    pub fn last_switch_error(&self) -> Option<SwitchError> {
        self.lock_state().switch.last_error.clone()
    }

    fn token_expired(&self, token: &str) -> bool {
        access_token_expired(token, self.clock.now(), self.config.leeway())
    }

    fn record_error(&self, err: &SessionError) {
        if err.is_user_visible() {
            self.lock_state().last_error = Some(err.clone());
        }
    }

    /// Fresh session bookkeeping after the store has been cleared or reset.
    fn reset_state(&self, keep_resume: bool) {
        let mut state = self.lock_state();
        state.switch.reset();
        state.last_error = None;
        if !keep_resume {
            state.resume = None;
        }
    }

    /// Error → Unauthenticated, unless the epoch already moved on.
    fn force_logout(&self, expected: Epoch, err: SessionError) -> SessionError {
        if !self.store.is_current(expected) {
            tracing::debug!(epoch = expected.value(), error = %err, "discarding stale failure");
            return SessionError::Stale;
        }
        self.store.transition(SessionStatus::Error);
        tracing::warn!(error = %err, "forcing logout");
        self.store.clear();
        self.reset_state(true);
        self.record_error(&err);
        err
    }

    /// `RefreshFailed` has already cleared the store; record it and reset.
    fn after_refresh_failure(&self, err: SessionError) -> SessionError {
        if err == SessionError::RefreshFailed {
            self.reset_state(true);
            self.record_error(&err);
        }
        err
    }

    // ─────────────────────────────────────────────────────────────────────
    // Startup
    // ─────────────────────────────────────────────────────────────────────

    /// Re-authenticate from persisted tokens.
    ///
    /// Holds the transition gate throughout, so [`Self::authorized_token`]
    /// callers wait until the session has settled.
    pub async fn initialize(&self) -> Result<SessionStatus, SessionError> {
        let gate = self.store.lock_transitions().await;

        let status = self.store.status();
        if status != SessionStatus::Uninitialized {
            return Err(SessionError::InvalidState(status));
        }
        let epoch = self.store.transition(SessionStatus::Initializing);

        let Some(tokens) = self.store.load_persisted() else {
            tracing::info!("no persisted session");
            self.store.clear();
            return Ok(SessionStatus::Unauthenticated);
        };

        let (epoch, access_token) = if self.token_expired(&tokens.access_token) {
            tracing::info!("persisted access token expired; refreshing");
            let epoch = self.store.transition(SessionStatus::Refreshing);
            match self.store.refresh(&gate, self.backend(), epoch).await {
                Ok(tokens) => (epoch, tokens.access_token),
                Err(err) => return Err(self.after_refresh_failure(err)),
            }
        } else {
            (epoch, tokens.access_token)
        };

        self.load_identity(epoch, &access_token, None).await?;
        Ok(SessionStatus::Authenticated)
    }

    /// Fetch the identity and publish it under `epoch`.
    async fn load_identity(
        &self,
        epoch: Epoch,
        access_token: &str,
        preferred: Option<Role>,
    ) -> Result<Arc<Identity>, SessionError> {
        let snapshot = match self.backend.current_identity(access_token).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "identity fetch failed");
                return Err(self.force_logout(epoch, SessionError::IdentityUnavailable));
            }
        };

        let identity = match Identity::materialize(snapshot, preferred) {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!(error = %err, "backend identity rejected");
                return Err(self.force_logout(epoch, SessionError::IdentityUnavailable));
            }
        };

        self.store.publish_identity(epoch, identity).inspect_err(|err| {
            if *err == SessionError::Stale {
                tracing::debug!(epoch = epoch.value(), "discarding stale identity response");
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sign-in
    // ─────────────────────────────────────────────────────────────────────

    fn unauthenticated_epoch(&self) -> Result<Epoch, SessionError> {
        let view = self.store.view();
        if view.status != SessionStatus::Unauthenticated {
            return Err(SessionError::InvalidState(view.status));
        }
        Ok(view.epoch)
    }

    fn credential_failure(&self, epoch: Epoch, err: BackendError) -> SessionError {
        if !self.store.is_current(epoch) {
            tracing::debug!(epoch = epoch.value(), "discarding stale sign-in failure");
            return SessionError::Stale;
        }
        tracing::warn!(error = %err, "sign-in failed");
        let err = SessionError::Credentials;
        self.record_error(&err);
        err
    }

    fn complete_sign_in(
        &self,
        epoch: Epoch,
        tokens: crate::storage::TokenPair,
        snapshot: learnhub_auth::IdentitySnapshot,
    ) -> Result<LoginOutcome, SessionError> {
        if !self.store.is_current(epoch) {
            tracing::debug!(epoch = epoch.value(), "discarding stale sign-in response");
            return Err(SessionError::Stale);
        }

        let identity = Identity::materialize(snapshot, None).map_err(|err| {
            tracing::warn!(error = %err, "backend identity rejected at sign-in");
            let err = SessionError::IdentityUnavailable;
            self.record_error(&err);
            err
        })?;

        let identity = self.store.establish(epoch, tokens, identity).inspect_err(|err| {
            self.record_error(err);
        })?;

        let resume = {
            let mut state = self.lock_state();
            state.last_error = None;
            state.switch.reset();
            state.resume.take()
        };
        Ok(LoginOutcome { identity, resume })
    }

    pub async fn login(&self, credentials: Credentials) -> Result<LoginOutcome, SessionError> {
        let epoch = self.unauthenticated_epoch()?;
        tracing::info!(email = %credentials.email, "signing in");

        match self.backend.login(&credentials).await {
            Ok(response) => self.complete_sign_in(epoch, response.tokens, response.user),
            Err(err) => Err(self.credential_failure(epoch, err)),
        }
    }

    /// Register an account; signs in only when the backend permits it.
    pub async fn register(&self, payload: RegistrationPayload) -> Result<RegistrationOutcome, SessionError> {
        let epoch = self.unauthenticated_epoch()?;
        tracing::info!(email = %payload.email, "registering");

        let response = match self.backend.register(&payload).await {
            Ok(response) => response,
            Err(err) => return Err(self.credential_failure(epoch, err)),
        };

        match response.session_tokens() {
            Some(tokens) => self
                .complete_sign_in(epoch, tokens, response.user)
                .map(RegistrationOutcome::SignedIn),
            None => {
                if !self.store.is_current(epoch) {
                    return Err(SessionError::Stale);
                }
                if response.auto_login {
                    tracing::warn!("auto-login indicated without a full token pair; staying signed out");
                }
                self.lock_state().last_error = None;
                Ok(RegistrationOutcome::Registered {
                    message: response.message.unwrap_or_else(|| REGISTERED_MESSAGE.to_string()),
                })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Exchange the refresh token and reload the identity.
    pub async fn refresh_session(&self) -> Result<Arc<Identity>, SessionError> {
        let gate = self.store.lock_transitions().await;
        self.refresh_locked(&gate).await
    }

    async fn refresh_locked(&self, gate: &TransitionGuard<'_>) -> Result<Arc<Identity>, SessionError> {
        let view = self.store.view();
        if view.status != SessionStatus::Authenticated {
            return Err(SessionError::NotAuthenticated);
        }
        let preferred = view.identity.as_ref().map(|i| i.active_role());

        let epoch = self.store.transition(SessionStatus::Refreshing);
        let tokens = match self.store.refresh(gate, self.backend(), epoch).await {
            Ok(tokens) => tokens,
            Err(err) => return Err(self.after_refresh_failure(err)),
        };

        self.load_identity(epoch, &tokens.access_token, preferred).await
    }

    /// Re-fetch roles and permissions, keeping the active role if still assigned.
    pub async fn reload_identity(&self) -> Result<Arc<Identity>, SessionError> {
        let (epoch, access_token, preferred) = {
            let view = self.store.view();
            if view.status != SessionStatus::Authenticated {
                return Err(SessionError::NotAuthenticated);
            }
            let token = self.store.access_token().ok_or(SessionError::NotAuthenticated)?;
            (view.epoch, token, view.identity.as_ref().map(|i| i.active_role()))
        };

        self.load_identity(epoch, &access_token, preferred).await
    }

    /// Access token for a protected request.
    ///
    /// Waits for any in-progress startup check or refresh and refreshes
    /// first when the token has expired locally.
    pub async fn authorized_token(&self) -> Result<String, SessionError> {
        let gate = self.store.lock_transitions().await;

        match self.store.status() {
            SessionStatus::Authenticated => {}
            SessionStatus::Uninitialized => return Err(SessionError::InvalidState(SessionStatus::Uninitialized)),
            _ => return Err(SessionError::NotAuthenticated),
        }

        let token = self.store.access_token().ok_or(SessionError::NotAuthenticated)?;
        if !self.token_expired(&token) {
            return Ok(token);
        }

        tracing::info!("access token expired; refreshing before request");
        self.refresh_locked(&gate).await?;
        self.store.access_token().ok_or(SessionError::NotAuthenticated)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sign-out
    // ─────────────────────────────────────────────────────────────────────

    /// User-confirmed logout.
    ///
    /// Local state is cleared first; the backend call is best-effort and its
    /// failure is only logged. Any request still in flight becomes stale.
    pub async fn logout(&self) {
        let access_token = self.store.access_token();
        let from = self.store.status();
        self.store.clear();
        self.reset_state(false);
        tracing::info!(%from, "logged out");

        if let Some(token) = access_token {
            if let Err(err) = self.backend.logout(&token).await {
                tracing::warn!(error = %err, "backend logout failed; local session already cleared");
            }
        }
    }

    /// Drop all in-memory state back to `Uninitialized`.
    ///
    /// Persisted tokens are kept so a later [`Self::initialize`] can resume.
    pub fn teardown(&self) {
        self.store.reset();
        let mut state = self.lock_state();
        state.switch.reset();
        state.last_error = None;
        state.resume = None;
        drop(state);
        tracing::info!("session machine torn down");
    }
}
