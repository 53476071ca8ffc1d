//! HTTP client for the analysis backend.
//!
//! Every call carries `Authorization: Bearer <token>` read from durable
//! storage. A 401 triggers exactly one `POST /auth/refresh-token`; if that
//! yields a token the original request is sent once more, otherwise the
//! stored identity is cleared and [`DeepchatError::SessionExpired`] is
//! returned so the front end can route back to login.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ApiConfig;
use crate::error::DeepchatError;
use crate::identity::IdentityStore;
use crate::models::message::MessageList;
use crate::models::{
    AnalysisStatus, ChatReply, Feedback, LoginRequestResponse, Message, RefreshResponse, Session,
    SessionPage, UploadResponse, VerifyResponse,
};
use crate::upload::CsvUpload;

// ============================================================================
// Backend traits
// ============================================================================

/// The chat endpoint, as seen by the transcript manager.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_message(
        &self,
        session_id: &str,
        user_query: &str,
    ) -> Result<ChatReply, DeepchatError>;
}

/// The deep-analysis endpoints, as seen by the progress tracker.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn start_analysis(&self, session_id: &str) -> Result<(), DeepchatError>;

    /// `Ok(None)` when the backend has no analysis for the session yet.
    async fn analysis_status(
        &self,
        session_id: &str,
    ) -> Result<Option<AnalysisStatus>, DeepchatError>;
}

// ============================================================================
// Wire helpers (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

async fn api_error(response: Response) -> DeepchatError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail)
        .map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

    tracing::debug!(status, detail = ?detail, "Backend returned an error");
    DeepchatError::Api { status, detail }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, DeepchatError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json::<T>().await?)
}

// ============================================================================
// ApiClient
// ============================================================================

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    identity: Arc<IdentityStore>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, identity: Arc<IdentityStore>) -> Result<Self, DeepchatError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn identity(&self) -> &Arc<IdentityStore> {
        &self.identity
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the stored token. The credentials file is read on the blocking
    /// pool so a slow disk never stalls the runtime.
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let identity = self.identity.clone();
        let token = match tokio::task::spawn_blocking(move || identity.bearer_token()).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Token lookup task failed");
                None
            }
        };
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send with the bearer token; on 401 refresh once and retry once.
    ///
    /// `build` is called again for the retry, so bodies that cannot be cloned
    /// (multipart) are rebuilt rather than replayed.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, DeepchatError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let response = self.authorize(build(&self.client)).await.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(url = %response.url(), "Request unauthorized, refreshing token");

        if let Err(e) = self.refresh_token().await {
            tracing::warn!(error = %e, "Token refresh rejected, clearing stored identity");
            if let Err(clear_err) = self.identity.clear() {
                tracing::warn!(error = %clear_err, "Failed to remove stored credentials");
            }
            return Err(DeepchatError::SessionExpired);
        }

        Ok(self.authorize(build(&self.client)).await.send().await?)
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    /// `POST /auth/request-login`: ask the backend to email a one-time password.
    pub async fn request_login(&self, email: &str) -> Result<LoginRequestResponse, DeepchatError> {
        let response = self
            .client
            .post(self.url("/auth/request-login"))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        parse_json(response).await
    }

    /// `POST /auth/verify-password`: exchange the one-time password for a token.
    pub async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<VerifyResponse, DeepchatError> {
        let response = self
            .client
            .post(self.url("/auth/verify-password"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        parse_json(response).await
    }

    /// `POST /auth/refresh-token`. Persists and returns the new token.
    /// A response without a token counts as a rejection.
    pub async fn refresh_token(&self) -> Result<String, DeepchatError> {
        let response = self
            .authorize(self.client.post(self.url("/auth/refresh-token")))
            .await
            .send()
            .await?;
        let refreshed: RefreshResponse = parse_json(response).await?;

        let token = refreshed
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                DeepchatError::Validation("refresh response carried no access token".to_string())
            })?;

        self.identity.replace_token(&token)?;
        tracing::debug!("Access token refreshed");
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    /// `POST /chat/upload_csv` with the file as multipart field `file`.
    /// Callers validate the upload first (see [`crate::upload::UploadPolicy`]).
    pub async fn upload_csv(&self, upload: &CsvUpload) -> Result<UploadResponse, DeepchatError> {
        let url = self.url("/chat/upload_csv");
        let response = self
            .send_authorized(|c| {
                let part = Part::bytes(upload.contents().to_vec())
                    .file_name(upload.file_name().to_string());
                c.post(&url).multipart(Form::new().part("file", part))
            })
            .await?;
        parse_json(response).await
    }

    pub async fn send_message(
        &self,
        session_id: &str,
        user_query: &str,
    ) -> Result<ChatReply, DeepchatError> {
        let url = self.url("/chat/chat");
        let response = self
            .send_authorized(|c| {
                c.post(&url)
                    .query(&[("session_id", session_id), ("user_query", user_query)])
            })
            .await?;
        parse_json(response).await
    }

    pub async fn submit_feedback(
        &self,
        message_id: &str,
        feedback: Feedback,
    ) -> Result<serde_json::Value, DeepchatError> {
        let url = self.url("/chat/feedback");
        let response = self
            .send_authorized(|c| {
                c.post(&url)
                    .query(&[("message_id", message_id), ("feedback", feedback.as_str())])
            })
            .await?;
        parse_json(response).await
    }

    /// `POST /chat/chat_summary`. The summary shape is backend-defined.
    pub async fn chat_summary(&self, session_id: &str) -> Result<serde_json::Value, DeepchatError> {
        let url = self.url("/chat/chat_summary");
        let response = self
            .send_authorized(|c| c.post(&url).query(&[("session_id", session_id)]))
            .await?;
        parse_json(response).await
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub async fn list_sessions(&self, page: u32, limit: u32) -> Result<SessionPage, DeepchatError> {
        let url = self.url("/sessions/get_all_sessions");
        let response = self
            .send_authorized(|c| c.get(&url).query(&[("page", page), ("limit", limit)]))
            .await?;
        parse_json(response).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session, DeepchatError> {
        let url = self.url("/sessions/get_session_by_id");
        let response = self
            .send_authorized(|c| c.get(&url).query(&[("session_id", session_id)]))
            .await?;
        parse_json(response).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), DeepchatError> {
        let url = self.url("/sessions/delete_session");
        let response = self
            .send_authorized(|c| c.delete(&url).query(&[("session_id", session_id)]))
            .await?;
        let _: serde_json::Value = parse_json(response).await?;
        Ok(())
    }

    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<Message>, DeepchatError> {
        let url = self.url("/sessions/get_session_messages");
        let response = self
            .send_authorized(|c| c.get(&url).query(&[("session_id", session_id)]))
            .await?;
        let list: MessageList = parse_json(response).await?;
        Ok(list.messages)
    }

    // ------------------------------------------------------------------
    // Deep analysis
    // ------------------------------------------------------------------

    pub async fn start_analysis(&self, session_id: &str) -> Result<serde_json::Value, DeepchatError> {
        let url = self.url("/deep_analysis/start");
        let response = self
            .send_authorized(|c| c.post(&url).query(&[("session_id", session_id)]))
            .await?;
        parse_json(response).await
    }

    /// `GET /deep_analysis/status/{session_id}`. A 404 or 500 means no
    /// analysis exists yet and yields `Ok(None)`.
    pub async fn analysis_status(
        &self,
        session_id: &str,
    ) -> Result<Option<AnalysisStatus>, DeepchatError> {
        let url = self.status_url(session_id)?;
        let response = self.send_authorized(|c| c.get(url.clone())).await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::debug!(session_id, status = %response.status(), "No analysis for session yet");
                Ok(None)
            }
            _ => parse_json(response).await.map(Some),
        }
    }

    fn status_url(&self, session_id: &str) -> Result<Url, DeepchatError> {
        let mut url = Url::parse(&self.url("/deep_analysis/status"))
            .map_err(|e| DeepchatError::Validation(format!("invalid API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DeepchatError::Validation("API base URL cannot carry a path".to_string()))?
            .push(session_id);
        Ok(url)
    }

    /// Fetch a generated report. Report URLs point at blob storage, so no
    /// bearer token is attached.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, DeepchatError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send_message(
        &self,
        session_id: &str,
        user_query: &str,
    ) -> Result<ChatReply, DeepchatError> {
        ApiClient::send_message(self, session_id, user_query).await
    }
}

#[async_trait]
impl AnalysisBackend for ApiClient {
    async fn start_analysis(&self, session_id: &str) -> Result<(), DeepchatError> {
        ApiClient::start_analysis(self, session_id).await.map(|_| ())
    }

    async fn analysis_status(
        &self,
        session_id: &str,
    ) -> Result<Option<AnalysisStatus>, DeepchatError> {
        ApiClient::analysis_status(self, session_id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
