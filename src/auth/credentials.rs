use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One user as provisioned by configuration.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    /// `salt$hash`, see [`crate::auth::password`]
    pub password_hash: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

// keeps the hash out of logs and panics
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("active", &self.active)
            .finish()
    }
}

/// Username → credential map, read by the authentication gate.
///
/// The configuration side may swap the whole set with
/// [`replace`](Self::replace); readers always see either the old or the new
/// set.
#[derive(Debug, Default)]
pub struct CredentialStore {
    users: RwLock<HashMap<String, Credential>>,
}

impl CredentialStore {
    pub fn new(users: Vec<Credential>) -> Self {
        let store = Self::default();
        store.replace(users);
        store
    }

    /// Later entries win when a username appears twice.
    pub fn replace(&self, users: Vec<Credential>) {
        let map = users
            .into_iter()
            .map(|c| (c.username.clone(), c))
            .collect();
        *self.users.write() = map;
    }

    /// Returns the credential only if it exists and is active.
    pub fn lookup_active(&self, username: &str) -> Option<Credential> {
        self.users
            .read()
            .get(username)
            .filter(|c| c.active)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}
