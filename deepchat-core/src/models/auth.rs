use serde::{Deserialize, Serialize};

/// The authenticated account. A token is always present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    email: String,
    access_token: String,
}

impl Identity {
    /// Returns `None` when either part is blank.
    pub fn new(email: impl Into<String>, access_token: impl Into<String>) -> Option<Self> {
        let email = email.into();
        let access_token = access_token.into();
        if email.trim().is_empty() || access_token.trim().is_empty() {
            return None;
        }
        Some(Self {
            email,
            access_token,
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(crate) fn with_token(&self, access_token: &str) -> Option<Self> {
        Self::new(self.email.clone(), access_token)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequestResponse {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerifyResponse {
    pub success: bool,
    pub access_token: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefreshResponse {
    pub access_token: Option<String>,
}
