//! Login and logout.
//!
//! Login is two steps: [`AuthContext::request_login`] has the backend email a
//! one-time password, [`AuthContext::login`] verifies it and stores the token.
//! Outcomes are reported through the [`Notifier`]; the boolean results mirror
//! what a login form needs to decide its next step.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::identity::IdentityStore;
use crate::models::Identity;
use crate::notify::Notifier;

pub struct AuthContext {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
}

impl AuthContext {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>) -> Self {
        Self { api, notifier }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn identity_store(&self) -> &Arc<IdentityStore> {
        self.api.identity()
    }

    pub fn current(&self) -> Option<Identity> {
        self.identity_store().identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity_store().is_authenticated()
    }

    /// Step one: ask for a one-time password. Returns whether the backend
    /// accepted the request.
    pub async fn request_login(&self, email: &str) -> bool {
        let email = email.trim();
        if email.is_empty() {
            self.notifier.error("Please enter your email");
            return false;
        }

        match self.api.request_login(email).await {
            Ok(resp) if resp.success => {
                tracing::info!(email, "Login password requested");
                self.notifier.success("Login instructions sent to your email!");
                true
            }
            Ok(resp) => {
                tracing::debug!(email, message = ?resp.message, "Login request not accepted");
                false
            }
            Err(e) => {
                self.notifier
                    .error(&e.user_message("Failed to send login email"));
                false
            }
        }
    }

    /// Step two: verify the password and persist the issued identity.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        let resp = match self.api.verify_password(email.trim(), password.trim()).await {
            Ok(resp) => resp,
            Err(e) => {
                self.notifier.error(&e.user_message("Login failed"));
                return false;
            }
        };

        if !resp.success {
            return false;
        }

        let account = resp.email.unwrap_or_else(|| email.trim().to_string());
        let Some(identity) = resp
            .access_token
            .and_then(|token| Identity::new(account, token))
        else {
            return false;
        };

        if let Err(e) = self.identity_store().establish(identity) {
            tracing::warn!(error = %e, "Could not persist credentials");
            self.notifier.error(&e.user_message("Login failed"));
            return false;
        }

        tracing::info!(email = %email.trim(), "Logged in");
        self.notifier.success("Login successful!");
        true
    }

    /// Clear stored and in-memory identity. Always reports success.
    pub fn logout(&self) {
        if let Err(e) = self.identity_store().clear() {
            tracing::warn!(error = %e, "Could not remove stored credentials");
        }
        tracing::info!("Logged out");
        self.notifier.success("Logged out successfully");
    }
}
