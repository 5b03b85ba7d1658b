//! Route guard: maps session state and an access requirement to a
//! navigation decision.

use learnhub_auth::{AccessDecision, DenialReason, Requirement, decide};
use serde::{Deserialize, Serialize};

use crate::lifecycle::AuthMachine;
use crate::status::SessionStatus;

/// Route to return to after the next successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeTarget(String);

impl ResumeTarget {
    pub fn new(route: impl Into<String>) -> Self {
        Self(route.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ResumeTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Proceed,
    /// Lifecycle has not settled; check again once it has.
    Pending,
    RedirectToLogin { resume: ResumeTarget },
    Refuse(DenialReason),
}

impl AuthMachine {
    pub fn guard(&self, route: &str, requirement: &Requirement) -> GuardOutcome {
        let view = self.view();
        match view.status {
            SessionStatus::Uninitialized | SessionStatus::Initializing | SessionStatus::Refreshing => {
                GuardOutcome::Pending
            }
            SessionStatus::Unauthenticated | SessionStatus::Error => {
                let resume = ResumeTarget::new(route);
                self.lock_state().resume = Some(resume.clone());
                tracing::debug!(%resume, "redirecting to login");
                GuardOutcome::RedirectToLogin { resume }
            }
            SessionStatus::Authenticated => match decide(view.identity.as_deref(), requirement) {
                AccessDecision::Granted => GuardOutcome::Proceed,
                AccessDecision::Denied(reason) => {
                    tracing::debug!(route, %reason, "route refused");
                    GuardOutcome::Refuse(reason)
                }
            },
        }
    }

    /// Hand out the stored resume target, leaving none behind.
    pub fn take_resume_target(&self) -> Option<ResumeTarget> {
        self.lock_state().resume.take()
    }
}
