use serde::Deserialize;

pub mod analysis;
pub mod auth;
pub mod message;
pub mod session;

pub use analysis::{AnalysisPhase, AnalysisStatus, KpiState};
pub use auth::{Identity, LoginRequestResponse, RefreshResponse, VerifyResponse};
pub use message::{ChatReply, Feedback, Message, MessageMetadata, Role};
pub use session::{CsvInfo, FileInfo, Pagination, Session, SessionPage, UploadResponse};

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
