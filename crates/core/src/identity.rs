//! Caller identity resolution
//!
//! The engine trusts the user id it is handed. Turning a credential into
//! that id is the job of an [`IdentityProvider`].

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::IdentityConfig;

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
}

/// Resolves a caller credential to a stable user id
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, credential: &str) -> Option<Identity>;
}

/// Fixed credential table, typically loaded from `[[identity.users]]`
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    by_credential: HashMap<String, Identity>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        let mut identity = Self::new();
        for entry in &config.users {
            identity.insert(&entry.credential, entry.user_id, &entry.display_name);
        }
        identity
    }

    pub fn insert(&mut self, credential: &str, user_id: Uuid, display_name: &str) {
        self.by_credential.insert(
            credential.to_string(),
            Identity {
                user_id,
                display_name: display_name.to_string(),
            },
        );
    }

    /// All known identities
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.by_credential.values()
    }
}

impl IdentityProvider for StaticIdentity {
    fn resolve(&self, credential: &str) -> Option<Identity> {
        self.by_credential.get(credential).cloned()
    }
}
