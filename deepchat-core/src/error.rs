use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeepchatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {}", .detail.as_deref().unwrap_or("no detail provided"))]
    Api { status: u16, detail: Option<String> },

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeepchatError {
    /// Server-provided `detail` text, if the backend sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            DeepchatError::Api { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Text for a user-facing notification: the server detail when present,
    /// the local reason for validation errors, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            DeepchatError::Api {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            DeepchatError::Validation(reason) => reason.clone(),
            DeepchatError::SessionExpired => self.to_string(),
            _ => fallback.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DeepchatError::Api { status, .. } => Some(*status),
            DeepchatError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
