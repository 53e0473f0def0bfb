//! Session gate checked before every task and goal operation.
//!
//! # Responsibility
//! - Decide whether the presented session token may act on the data.
//! - Hold the token of the signed-in user for long-lived planner handles.
//!
//! # Invariants
//! - Verification runs before validation and before any state change, so an
//!   unauthenticated call never mutates local or persisted state.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

/// Authentication failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No session token was presented.
    MissingSession,
    /// A token was presented but the guard rejected it.
    InvalidSession,
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSession => write!(f, "unauthorized: no active session"),
            Self::InvalidSession => write!(f, "unauthorized: session rejected"),
        }
    }
}

impl Error for AuthError {}

/// Policy deciding which session tokens are accepted.
pub trait SessionGuard: Send + Sync {
    fn verify(&self, token: Option<&str>) -> Result<(), AuthError>;
}

/// Accepts every caller. Used for the single-user local profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSessionGuard;

impl SessionGuard for OpenSessionGuard {
    fn verify(&self, _token: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Accepts exactly one configured token.
#[derive(Debug, Clone)]
pub struct StaticTokenGuard {
    token: String,
}

impl StaticTokenGuard {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl SessionGuard for StaticTokenGuard {
    fn verify(&self, token: Option<&str>) -> Result<(), AuthError> {
        match token.map(str::trim) {
            None | Some("") => Err(AuthError::MissingSession),
            Some(presented) if presented == self.token => Ok(()),
            Some(_) => Err(AuthError::InvalidSession),
        }
    }
}

/// Guard plus the token currently signed in. Cloning shares the token slot.
#[derive(Clone)]
pub struct Session {
    guard: Arc<dyn SessionGuard>,
    token: Arc<RwLock<Option<String>>>,
}

impl Session {
    pub fn new(guard: Arc<dyn SessionGuard>) -> Self {
        Self {
            guard,
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn sign_out(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Verifies the signed-in token against the guard.
    pub fn check(&self) -> Result<(), AuthError> {
        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        self.guard.verify(token.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthError, OpenSessionGuard, Session, SessionGuard, StaticTokenGuard};
    use std::sync::Arc;

    #[test]
    fn open_guard_accepts_anonymous_callers() {
        assert!(OpenSessionGuard.verify(None).is_ok());
    }

    #[test]
    fn static_guard_distinguishes_missing_from_wrong_token() {
        let guard = StaticTokenGuard::new("s3cret");
        assert_eq!(guard.verify(None), Err(AuthError::MissingSession));
        assert_eq!(guard.verify(Some("  ")), Err(AuthError::MissingSession));
        assert_eq!(guard.verify(Some("nope")), Err(AuthError::InvalidSession));
        assert!(guard.verify(Some("s3cret")).is_ok());
    }

    #[test]
    fn session_clones_share_sign_in_state() {
        let session = Session::new(Arc::new(StaticTokenGuard::new("t")));
        let clone = session.clone();
        assert_eq!(clone.check(), Err(AuthError::MissingSession));

        session.sign_in("t");
        assert!(clone.check().is_ok());

        session.sign_out();
        assert!(clone.check().is_err());
    }
}
