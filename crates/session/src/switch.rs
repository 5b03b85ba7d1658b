//! Role-switch protocol.
//!
//! A single in-flight slot, no queue. The active role changes only once the
//! backend confirms it, and only if the session is still the one the request
//! was issued under.

use std::sync::Arc;

use learnhub_auth::{Identity, Role};

use crate::backend::BackendError;
use crate::error::SwitchError;
use crate::lifecycle::AuthMachine;
use crate::status::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingSwitch {
    ticket: u64,
    target: Role,
}

#[derive(Debug, Default)]
pub(crate) struct SwitchSlot {
    in_flight: Option<PendingSwitch>,
    next_ticket: u64,
    pub(crate) last_error: Option<SwitchError>,
}

impl SwitchSlot {
    /// Forget the pending switch and its error. Tickets keep counting so a
    /// late reply can never match a newer request.
    pub(crate) fn reset(&mut self) {
        self.in_flight = None;
        self.last_error = None;
    }

    fn claim(&mut self, target: Role) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(PendingSwitch { ticket, target });
        ticket
    }

    /// Release the slot if `ticket` still owns it.
    fn release(&mut self, ticket: u64) -> bool {
        match self.in_flight {
            Some(pending) if pending.ticket == ticket => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched { from: Role, to: Role },
    /// Target was already active; nothing was sent.
    Unchanged(Role),
}

impl From<BackendError> for SwitchError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized => SwitchError::Rejected("not authorized".to_string()),
            BackendError::Rejected { message } => SwitchError::Rejected(message),
            BackendError::Transport(_) => SwitchError::Unreachable,
            BackendError::Malformed(_) => SwitchError::Rejected("unexpected server response".to_string()),
        }
    }
}

impl AuthMachine {
    /// Role currently awaiting confirmation, if any.
    pub fn switch_in_flight(&self) -> Option<Role> {
        self.lock_state().switch.in_flight.map(|p| p.target)
    }

    /// Ask the backend to make `target` the active role.
    ///
    /// Preconditions are checked before any network call, in this order:
    /// authenticated, target assigned, no switch pending, target not already
    /// active.
    pub async fn switch_role(&self, target: Role) -> Result<SwitchOutcome, SwitchError> {
        let (epoch, ticket, from, access_token) = {
            let mut state = self.lock_state();
            let view = self.store().view();

            let identity = match (&view.status, &view.identity) {
                (SessionStatus::Authenticated, Some(identity)) => Arc::clone(identity),
                _ => return Err(SwitchError::NotAuthenticated),
            };
            if !identity.has_role(target) {
                let err = SwitchError::NotAssigned(target);
                state.switch.last_error = Some(err.clone());
                return Err(err);
            }
            if let Some(pending) = state.switch.in_flight {
                tracing::debug!(pending = %pending.target, requested = %target, "switch already in flight");
                return Err(SwitchError::InFlight { pending: pending.target });
            }
            let from = identity.active_role();
            if from == target {
                return Ok(SwitchOutcome::Unchanged(target));
            }
            let Some(access_token) = self.store().access_token() else {
                return Err(SwitchError::NotAuthenticated);
            };

            let ticket = state.switch.claim(target);
            (view.epoch, ticket, from, access_token)
        };

        tracing::info!(%from, to = %target, "requesting role switch");
        let result = self.backend().switch_role(&access_token, target).await;

        let mut state = self.lock_state();
        let owned = state.switch.release(ticket);
        if !owned || !self.store().is_current(epoch) {
            tracing::debug!(to = %target, epoch = epoch.value(), "discarding stale switch response");
            return Err(SwitchError::Stale);
        }

        let failure = match result {
            Err(err) => {
                tracing::warn!(error = %err, to = %target, "role switch failed");
                SwitchError::from(err)
            }
            Ok(confirmed) if confirmed.active_role != target => {
                tracing::warn!(requested = %target, confirmed = %confirmed.active_role, "role switch confirmed a different role");
                SwitchError::Mismatch {
                    requested: target,
                    confirmed: confirmed.active_role,
                }
            }
            Ok(_) => match self.store().swap_identity(epoch, |current: &Identity| current.with_active_role(target)) {
                Some(Ok(identity)) => {
                    state.switch.last_error = None;
                    tracing::info!(%from, to = %identity.active_role(), "active role switched");
                    return Ok(SwitchOutcome::Switched { from, to: target });
                }
                // Role withdrawn by a permission reload while the switch was pending.
                Some(Err(_)) => SwitchError::NotAssigned(target),
                None => return Err(SwitchError::Stale),
            },
        };

        state.switch.last_error = Some(failure.clone());
        Err(failure)
    }
}
