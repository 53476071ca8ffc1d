use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default upload ceiling: 30 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 30 * 1024 * 1024;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeepchatConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub credentials_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_path: "~/.config/deepchat/credentials.json".to_string(),
        }
    }
}

impl StorageConfig {
    /// Credentials path with `~` and environment variables expanded.
    pub fn resolved_credentials_path(&self) -> PathBuf {
        match shellexpand::full(&self.credentials_path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                tracing::warn!(
                    path = %self.credentials_path,
                    error = %e,
                    "Could not expand credentials path, using it verbatim"
                );
                PathBuf::from(&self.credentials_path)
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub poll_interval_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
        }
    }
}

impl AnalysisConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl DeepchatConfig {
    /// Load from an optional TOML file, then `DEEPCHAT_*` environment
    /// variables (`DEEPCHAT_API__BASE_URL`, `DEEPCHAT_ANALYSIS__POLL_INTERVAL_MS`, ...).
    /// Missing files are not an error; every setting has a default.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("DEEPCHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = DeepchatConfig::load("/nonexistent/deepchat-test-config").unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.analysis.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.upload.max_bytes, 31_457_280);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_partial_file_overrides_only_given_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[api]\nbase_url = \"https://analysis.example.com\"\ntimeout_seconds = 5\n\n[analysis]\npoll_interval_ms = 3000"
        )
        .unwrap();

        let config = DeepchatConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.api.base_url, "https://analysis.example.com");
        assert_eq!(config.api.timeout(), Duration::from_secs(5));
        assert_eq!(config.analysis.poll_interval_ms, 3000);
        assert_eq!(config.upload.max_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_credentials_path_resolution() {
        let storage = StorageConfig::default();
        assert!(storage
            .resolved_credentials_path()
            .ends_with("deepchat/credentials.json"));

        let absolute = StorageConfig {
            credentials_path: "/var/lib/deepchat/creds.json".to_string(),
        };
        assert_eq!(
            absolute.resolved_credentials_path(),
            PathBuf::from("/var/lib/deepchat/creds.json")
        );
    }
}
