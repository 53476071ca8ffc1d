use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.code_explanation.is_none() && self.file_url.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

fn default_content_type() -> String {
    "text".to_string()
}

impl Message {
    pub fn user(id: impl Into<String>, session_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.to_string(),
            role: Role::User,
            content: content.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            content_type: default_content_type(),
            metadata: None,
        }
    }

    /// Build the assistant entry for a chat reply.
    pub fn assistant(session_id: &str, reply: ChatReply) -> Self {
        let metadata = MessageMetadata {
            code: reply.code,
            code_explanation: reply.code_explanation,
            file_url: reply.file_url,
        };
        Self {
            id: reply.message_id,
            session_id: session_id.to_string(),
            role: Role::Assistant,
            content: reply.response,
            created_at: chrono::Utc::now().to_rfc3339(),
            content_type: default_content_type(),
            metadata: (!metadata.is_empty()).then_some(metadata),
        }
    }
}

/// Response of `POST /chat/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub code_explanation: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    pub message_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    ThumbsUp,
    ThumbsDown,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::ThumbsUp => "thumbs_up",
            Feedback::ThumbsDown => "thumbs_down",
        }
    }
}

/// Response of `GET /sessions/get_session_messages`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageList {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub messages: Vec<Message>,
}
