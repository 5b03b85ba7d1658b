//! Session store: token bookkeeping, lifecycle status, published identity.
//!
//! Reads are public; every write is crate-private and driven by the
//! lifecycle machine. Each status transition bumps the [`Epoch`] so results
//! of requests issued under an older epoch can be recognised and dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use learnhub_auth::Identity;
use learnhub_core::SessionId;

use crate::backend::AuthBackend;
use crate::error::SessionError;
use crate::status::SessionStatus;
use crate::storage::{TokenPair, TokenStorage};

/// Version tag a request carries from issue to resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct StoreState {
    tokens: Option<TokenPair>,
    identity: Option<Arc<Identity>>,
    status: SessionStatus,
    epoch: u64,
    session_id: Option<SessionId>,
}

impl StoreState {
    fn enter(&mut self, to: SessionStatus) -> Epoch {
        self.status = to;
        self.epoch += 1;
        Epoch(self.epoch)
    }
}

/// Read-only snapshot of the session for consumers.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub status: SessionStatus,
    pub identity: Option<Arc<Identity>>,
    pub epoch: Epoch,
    pub session_id: Option<SessionId>,
    pub has_tokens: bool,
}

/// Proof that the caller holds the transition gate.
///
/// Startup checks and refreshes run under this gate; protected requests wait
/// on it so none of them proceeds with a token that is being replaced.
pub struct TransitionGuard<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

pub struct SessionStore {
    storage: Arc<dyn TokenStorage>,
    state: Mutex<StoreState>,
    transitions: tokio::sync::Mutex<()>,
}

impl core::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionStore").field("view", &self.view()).finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            storage,
            state: Mutex::new(StoreState::default()),
            transitions: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> SessionView {
        let s = self.lock();
        SessionView {
            status: s.status,
            identity: s.identity.clone(),
            epoch: Epoch(s.epoch),
            session_id: s.session_id,
            has_tokens: s.tokens.is_some(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn identity(&self) -> Option<Arc<Identity>> {
        self.lock().identity.clone()
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(self.lock().epoch)
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.lock().epoch == epoch.0
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.lock().tokens.as_ref().map(|t| t.access_token.clone())
    }

    /// Wait for any in-progress startup check or refresh, then hold the gate.
    pub(crate) async fn lock_transitions(&self) -> TransitionGuard<'_> {
        TransitionGuard {
            _guard: self.transitions.lock().await,
        }
    }

    /// Move to `to` and return the new epoch.
    pub(crate) fn transition(&self, to: SessionStatus) -> Epoch {
        let mut s = self.lock();
        let from = s.status;
        let epoch = s.enter(to);
        tracing::debug!(%from, %to, epoch = epoch.0, "session transition");
        epoch
    }

    /// Adopt the persisted token pair into memory, if there is a usable one.
    pub(crate) fn load_persisted(&self) -> Option<TokenPair> {
        let loaded = match self.storage.load() {
            Ok(tokens) => tokens,
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable persisted tokens");
                if let Err(err) = self.storage.clear() {
                    tracing::error!(error = %err, "failed to clear token storage");
                }
                None
            }
        };

        let mut s = self.lock();
        s.tokens = loaded.clone();
        loaded
    }

    /// Commit tokens and identity together and enter `Authenticated`.
    pub(crate) fn establish(
        &self,
        expected: Epoch,
        tokens: TokenPair,
        identity: Identity,
    ) -> Result<Arc<Identity>, SessionError> {
        let mut s = self.lock();
        if s.epoch != expected.0 {
            return Err(SessionError::Stale);
        }

        self.storage.save(&tokens)?;

        let identity = Arc::new(identity);
        let session_id = SessionId::new();
        s.tokens = Some(tokens);
        s.identity = Some(identity.clone());
        s.session_id = Some(session_id);
        let epoch = s.enter(SessionStatus::Authenticated);
        tracing::info!(%session_id, user_id = %identity.id(), active_role = %identity.active_role(), epoch = epoch.0, "session established");
        Ok(identity)
    }

    /// Replace the identity wholesale and (re)enter `Authenticated`.
    ///
    /// Used after a startup check, refresh or permission reload, when the
    /// tokens in memory are already the current ones.
    pub(crate) fn publish_identity(&self, expected: Epoch, identity: Identity) -> Result<Arc<Identity>, SessionError> {
        let mut s = self.lock();
        if s.epoch != expected.0 {
            return Err(SessionError::Stale);
        }
        if s.tokens.is_none() {
            return Err(SessionError::NotAuthenticated);
        }

        let identity = Arc::new(identity);
        s.identity = Some(identity.clone());
        if s.session_id.is_none() {
            s.session_id = Some(SessionId::new());
        }
        if s.status != SessionStatus::Authenticated {
            s.enter(SessionStatus::Authenticated);
        }
        tracing::info!(user_id = %identity.id(), active_role = %identity.active_role(), epoch = s.epoch, "identity published");
        Ok(identity)
    }

    /// Atomically derive a new identity from the current one.
    ///
    /// Returns `None` when the epoch moved on or no identity is present.
    pub(crate) fn swap_identity<F, E>(&self, expected: Epoch, derive: F) -> Option<Result<Arc<Identity>, E>>
    where
        F: FnOnce(&Identity) -> Result<Identity, E>,
    {
        let mut s = self.lock();
        if s.epoch != expected.0 {
            return None;
        }
        let current = s.identity.as_ref()?;
        Some(derive(current).map(|next| {
            let next = Arc::new(next);
            s.identity = Some(next.clone());
            next
        }))
    }

    /// Remove tokens and identity and enter `Unauthenticated`.
    pub(crate) fn clear(&self) -> Epoch {
        let mut s = self.lock();
        self.clear_locked(&mut s)
    }

    fn clear_locked(&self, s: &mut StoreState) -> Epoch {
        if let Err(err) = self.storage.clear() {
            tracing::error!(error = %err, "failed to clear token storage");
        }
        s.tokens = None;
        s.identity = None;
        if let Some(session_id) = s.session_id.take() {
            tracing::info!(%session_id, "session cleared");
        }
        s.enter(SessionStatus::Unauthenticated)
    }

    /// Drop in-memory state back to `Uninitialized`; persisted tokens stay.
    pub(crate) fn reset(&self) -> Epoch {
        let mut s = self.lock();
        s.tokens = None;
        s.identity = None;
        s.session_id = None;
        s.enter(SessionStatus::Uninitialized)
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// On failure the session is cleared and [`SessionError::RefreshFailed`]
    /// returned; there is no retry. A result arriving after the epoch moved
    /// on is dropped as [`SessionError::Stale`] without touching state.
    pub(crate) async fn refresh(
        &self,
        _gate: &TransitionGuard<'_>,
        backend: &dyn AuthBackend,
        expected: Epoch,
    ) -> Result<TokenPair, SessionError> {
        let refresh_token = {
            let mut s = self.lock();
            if s.epoch != expected.0 {
                return Err(SessionError::Stale);
            }
            let token = s.tokens.as_ref().map(|t| t.refresh_token.clone());
            match token {
                Some(token) => token,
                None => {
                    tracing::warn!("no refresh token available; clearing session");
                    self.clear_locked(&mut s);
                    return Err(SessionError::RefreshFailed);
                }
            }
        };

        let result = backend.refresh(&refresh_token).await;

        let mut s = self.lock();
        if s.epoch != expected.0 {
            tracing::debug!(epoch = expected.0, "discarding stale refresh response");
            return Err(SessionError::Stale);
        }

        match result {
            Ok(tokens) => {
                if let Err(err) = self.storage.save(&tokens) {
                    tracing::error!(error = %err, "failed to persist refreshed tokens");
                    if let Err(err) = self.storage.clear() {
                        tracing::error!(error = %err, "failed to clear token storage");
                    }
                }
                s.tokens = Some(tokens.clone());
                tracing::info!(epoch = expected.0, "tokens refreshed");
                Ok(tokens)
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed; clearing session");
                self.clear_locked(&mut s);
                Err(SessionError::RefreshFailed)
            }
        }
    }
}
