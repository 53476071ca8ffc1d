pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod identity;
pub mod models;
pub mod notify;
pub mod progress;
pub mod routes;
pub mod storage;
pub mod transcript;
pub mod upload;

pub use api::{AnalysisBackend, ApiClient, ChatBackend};
pub use auth::AuthContext;
pub use config::DeepchatConfig;
pub use dashboard::Dashboard;
pub use error::DeepchatError;
pub use identity::IdentityStore;
pub use notify::{Notification, Notifier, RecordingNotifier};
pub use progress::{AnalysisSnapshot, AnalysisTracker, PollHandle};
pub use routes::Route;
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use transcript::{SendOutcome, SubmitRejected, Transcript};
pub use upload::{CsvUpload, UploadPolicy};
