//! Client-side CSV upload checks. Everything here runs before the network.

use std::path::Path;

use crate::config::{UploadConfig, DEFAULT_MAX_UPLOAD_BYTES};
use crate::error::DeepchatError;

/// A CSV file picked for upload.
#[derive(Debug, Clone)]
pub struct CsvUpload {
    file_name: String,
    contents: Vec<u8>,
}

impl CsvUpload {
    pub fn new(file_name: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            contents,
        }
    }

    /// Read a file from disk, refusing it before reading when its name or size
    /// already fails `policy`.
    pub async fn from_path(path: &Path, policy: &UploadPolicy) -> Result<Self, DeepchatError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = tokio::fs::metadata(path).await?.len();
        policy.check(&file_name, size)?;

        let contents = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, contents))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl From<&UploadConfig> for UploadPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
        }
    }
}

impl UploadPolicy {
    /// Name must end in `.csv`; size must not exceed `max_bytes`.
    pub fn check(&self, file_name: &str, size: u64) -> Result<(), DeepchatError> {
        if !file_name.to_ascii_lowercase().ends_with(".csv") {
            return Err(DeepchatError::Validation(
                "Please upload a CSV file".to_string(),
            ));
        }
        if size > self.max_bytes {
            return Err(DeepchatError::Validation(format!(
                "File size must be less than {}MB",
                self.max_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    /// Exactly one file per upload, and it must pass [`UploadPolicy::check`].
    pub fn select(&self, mut files: Vec<CsvUpload>) -> Result<CsvUpload, DeepchatError> {
        if files.len() != 1 {
            return Err(DeepchatError::Validation(format!(
                "Upload exactly one CSV file ({} selected)",
                files.len()
            )));
        }
        let file = files.remove(0);
        self.check(file.file_name(), file.size())?;
        Ok(file)
    }
}
