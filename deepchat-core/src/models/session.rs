use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A server-tracked unit of work bound to one uploaded CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub file_info: Option<FileInfo>,
    #[serde(default)]
    pub csv_info: Option<CsvInfo>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub smart_questions: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Session {
    pub fn original_filename(&self) -> Option<&str> {
        self.file_info
            .as_ref()
            .and_then(|f| f.original_filename.as_deref())
    }

    pub fn display_name(&self) -> &str {
        self.original_filename().unwrap_or("Unknown file")
    }
}

/// File metadata. The upload response and the stored session describe the
/// file differently, so every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileInfo {
    pub original_filename: Option<String>,
    pub blob_name: Option<String>,
    pub container_name: Option<String>,
    pub file_url: Option<String>,
    pub file_size: Option<u64>,
    pub content_type: Option<String>,
    pub total_rows: Option<u64>,
    pub total_columns: Option<u64>,
    pub column_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvInfo {
    pub total_columns: u64,
    pub column_names: Vec<String>,
    pub preview_data: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub limit: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Response of `GET /sessions/get_all_sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionPage {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub sessions: Vec<Session>,
    pub pagination: Pagination,
}

/// Response of `POST /chat/upload_csv`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub session_id: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_info: Option<FileInfo>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub preview_data: Vec<Map<String, Value>>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub smart_questions: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: bool,
}
