//! In-memory identity backed by durable credential storage.
//!
//! Created once at startup with [`IdentityStore::init`], shared as
//! `Arc<IdentityStore>` by the API client and the auth context, and torn down
//! with [`IdentityStore::clear`] on logout or when a token refresh is rejected.

use std::sync::{Arc, RwLock};

use crate::error::DeepchatError;
use crate::models::Identity;
use crate::storage::CredentialStore;

pub struct IdentityStore {
    durable: Arc<dyn CredentialStore>,
    current: RwLock<Option<Identity>>,
}

impl IdentityStore {
    /// Rebuild the identity from durable storage. Both token and email must be
    /// present and non-empty; anything else starts unauthenticated.
    pub fn init(durable: Arc<dyn CredentialStore>) -> Self {
        let current = match durable.load() {
            Ok(stored) => match (stored.user_email, stored.access_token) {
                (Some(email), Some(token)) => Identity::new(email, token),
                _ => None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not read stored credentials, starting logged out");
                None
            }
        };

        if let Some(identity) = &current {
            tracing::debug!(email = %identity.email(), "Restored identity from storage");
        }

        Self {
            durable,
            current: RwLock::new(current),
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    /// Token for the next outgoing request, read from durable storage.
    pub fn bearer_token(&self) -> Option<String> {
        match self.durable.load() {
            Ok(stored) => stored.access_token.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read stored token");
                None
            }
        }
    }

    /// Persist a freshly verified identity and make it current.
    pub fn establish(&self, identity: Identity) -> Result<(), DeepchatError> {
        self.durable
            .save(identity.access_token(), identity.email())?;
        *self.write() = Some(identity);
        Ok(())
    }

    /// Persist a refreshed token. The email of the current identity is kept.
    pub fn replace_token(&self, access_token: &str) -> Result<(), DeepchatError> {
        if access_token.trim().is_empty() {
            return Err(DeepchatError::Validation(
                "refreshed token is empty".to_string(),
            ));
        }
        self.durable.save_token(access_token)?;
        let mut current = self.write();
        if let Some(updated) = current.as_ref().and_then(|i| i.with_token(access_token)) {
            *current = Some(updated);
        }
        Ok(())
    }

    /// Drop the identity from memory and storage. The in-memory identity is
    /// cleared even when the durable clear fails.
    pub fn clear(&self) -> Result<(), DeepchatError> {
        *self.write() = None;
        self.durable.clear()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Identity>> {
        self.current.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Identity>> {
        self.current.write().unwrap_or_else(|p| p.into_inner())
    }
}
