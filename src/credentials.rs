//! Credential lookup for the agent backend.
//!
//! Execution only ever sees [`Credentials`] resolved through
//! [`CredentialSource`], so replacing plaintext storage with a secret store
//! touches this module and nothing downstream.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::EntityStore;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The user's email; the agent logs in with it.
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields must be non-empty before a request is made.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait CredentialSource {
    /// Credentials of a user, or `None` when the user does not exist.
    fn credentials_for(&self, user_id: u64) -> Option<Credentials>;
}

impl CredentialSource for EntityStore {
    fn credentials_for(&self, user_id: u64) -> Option<Credentials> {
        self.user(user_id)
            .map(|u| Credentials::new(u.email.clone(), u.password.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness() {
        assert!(Credentials::new("a@b.io", "pw").is_complete());
        assert!(!Credentials::new("a@b.io", "").is_complete());
        assert!(!Credentials::new("  ", "pw").is_complete());
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("a@b.io", "hunter2"));
        assert!(rendered.contains("a@b.io"));
        assert!(!rendered.contains("hunter2"));
    }
}
