//! Auth context the reconciler reads its push credential from.
//!
//! Obtaining the token (login) happens elsewhere; this module only holds
//! the current value so the reconciler can read it at `initialize` time.

use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Supplies the bearer token used for the push channel and snapshot
/// requests.
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// The current token, if the caller is authenticated.
    fn token(&self) -> Option<String>;
}

/// Settable in-memory credential.
#[derive(Default)]
pub struct SessionCredential {
    token: RwLock<Option<String>>,
}

impl SessionCredential {
    /// Creates a credential holding `token`. Blank tokens count as absent.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    /// Replaces the token.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(token).filter(|t| !t.trim().is_empty());
    }

    /// Forgets the token (logout).
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialSource for SessionCredential {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("SessionCredential")
            .field("token", &if present { "<redacted>" } else { "<none>" })
            .finish()
    }
}
