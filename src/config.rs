//! Client configuration.
//!
//! Resolution order: built-in defaults, then `config.toml` (explicit path or
//! the platform config dir), then environment overrides.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_STORAGE_NAME: &str = "auth-storage";
const DEFAULT_HYDRATION_FALLBACK_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "GRADEDESK_API_URL";
pub const ENV_STORAGE_DIR: &str = "GRADEDESK_STORAGE_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root including the `/api` prefix.
    pub api_base_url: String,
    /// Where the session record lives. Defaults to the platform data dir.
    pub storage_dir: Option<PathBuf>,
    /// File stem of the session record.
    pub storage_name: String,
    /// Upper bound on waiting for session restore at boot.
    pub hydration_fallback_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            storage_dir: None,
            storage_name: DEFAULT_STORAGE_NAME.into(),
            hydration_fallback_ms: DEFAULT_HYDRATION_FALLBACK_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Load from `path`, or from the default location when `None`. A missing
    /// file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                toml::from_str::<Self>(&raw)
                    .with_context(|| format!("parsing config {}", p.display()))?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var(ENV_STORAGE_DIR) {
            if !dir.trim().is_empty() {
                self.storage_dir = Some(PathBuf::from(dir.trim()));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            bail!("api_base_url cannot be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("api_base_url must be an http(s) URL, got '{url}'");
        }
        if self.storage_name.trim().is_empty() {
            bail!("storage_name cannot be empty");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn hydration_fallback(&self) -> Duration {
        Duration::from_millis(self.hydration_fallback_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolved directory for the session record.
    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .or_else(|| project_dirs().map(|d| d.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(".gradedesk"))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "gradedesk", "gradedesk")
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}
