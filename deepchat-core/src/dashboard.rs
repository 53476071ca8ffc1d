//! Session list view-model: paging, search filter, upload and delete.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::error::DeepchatError;
use crate::models::Session;
use crate::notify::Notifier;
use crate::upload::{CsvUpload, UploadPolicy};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

pub struct Dashboard {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
    policy: UploadPolicy,
    page_size: u32,
    sessions: Vec<Session>,
    current_page: u32,
    total_pages: u32,
    total_count: u64,
}

impl Dashboard {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>, policy: UploadPolicy) -> Self {
        Self {
            api,
            notifier,
            policy,
            page_size: DEFAULT_PAGE_SIZE,
            sessions: Vec::new(),
            current_page: 1,
            total_pages: 1,
            total_count: 0,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Fetch one page of sessions. The previous list is kept on failure.
    pub async fn load(&mut self, page: u32) -> Result<(), DeepchatError> {
        match self.api.list_sessions(page.max(1), self.page_size).await {
            Ok(resp) => {
                self.sessions = resp.sessions;
                self.current_page = resp.pagination.current_page;
                self.total_pages = resp.pagination.total_pages;
                self.total_count = resp.pagination.total_count;
                Ok(())
            }
            Err(e) => {
                if !matches!(e, DeepchatError::SessionExpired) {
                    self.notifier.error("Failed to load sessions");
                }
                Err(e)
            }
        }
    }

    /// Sessions whose file name or id contains `term`, ignoring case.
    pub fn filtered(&self, term: &str) -> Vec<&Session> {
        let needle = term.trim().to_lowercase();
        self.sessions
            .iter()
            .filter(|s| {
                needle.is_empty()
                    || s.session_id.to_lowercase().contains(&needle)
                    || s
                        .original_filename()
                        .is_some_and(|f| f.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Validate locally, then upload. Returns the new session id.
    pub async fn upload(&self, files: Vec<CsvUpload>) -> Result<String, DeepchatError> {
        let file = match self.policy.select(files) {
            Ok(file) => file,
            Err(e) => {
                self.notifier.error(&e.user_message("Failed to upload CSV"));
                return Err(e);
            }
        };

        match self.api.upload_csv(&file).await {
            Ok(resp) => {
                tracing::info!(
                    session_id = %resp.session_id,
                    file = %file.file_name(),
                    bytes = file.size(),
                    "CSV uploaded"
                );
                self.notifier.success("CSV uploaded successfully!");
                Ok(resp.session_id)
            }
            Err(e) => {
                self.notifier.error(&e.user_message("Failed to upload CSV"));
                Err(e)
            }
        }
    }

    /// Delete a session, then reload the current page. A failed reload is
    /// reported by [`Dashboard::load`] and does not undo the delete.
    pub async fn delete(&mut self, session_id: &str) -> Result<(), DeepchatError> {
        if let Err(e) = self.api.delete_session(session_id).await {
            self.notifier.error("Failed to delete session");
            return Err(e);
        }
        self.notifier.success("Session deleted successfully");

        let page = self.current_page;
        if let Err(e) = self.load(page).await {
            tracing::debug!(session_id, error = %e, "Reload after delete failed");
        }
        Ok(())
    }
}
