//! Runtime configuration
//!
//! Settings are read from `<data_local_dir>/civicloop/settings.json` when the
//! file exists, then overridden by `CIVICLOOP_*` environment variables. The
//! analysis API key is never stored here; it only comes from the environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Overrides [`Settings::data_dir`]
pub const ENV_DATA_DIR: &str = "CIVICLOOP_DATA_DIR";
/// Overrides [`Settings::baseline_path`]
pub const ENV_BASELINE: &str = "CIVICLOOP_BASELINE";
/// Overrides [`Settings::analysis_url`]
pub const ENV_ANALYSIS_URL: &str = "CIVICLOOP_NLU_URL";
/// Overrides [`Settings::analysis_timeout_seconds`]
pub const ENV_ANALYSIS_TIMEOUT: &str = "CIVICLOOP_NLU_TIMEOUT_SECONDS";
/// Analysis API key
pub const ENV_ANALYSIS_API_KEY: &str = "CIVICLOOP_NLU_API_KEY";

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Errors that can occur while loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON
    #[error("invalid settings file: {0}")]
    Json(#[from] serde_json::Error),

    /// A setting or environment override has an unusable value
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Setting or variable name
        var: &'static str,
        /// Raw value
        value: String,
    },
}

/// CivicLoop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root for all local state
    pub data_dir: PathBuf,
    /// Baseline dataset file; the bundled dataset is used when unset
    pub baseline_path: Option<PathBuf>,
    /// Base URL of the analysis service instance
    pub analysis_url: Option<String>,
    /// Upper bound on a single analysis request
    pub analysis_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            baseline_path: None,
            analysis_url: None,
            analysis_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl Settings {
    /// Load from the default settings file and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = default_data_dir().join("settings.json");
        Self::load_from(Some(path.as_path()), |var| std::env::var(var).ok())
    }

    /// Load from `path` (skipped when missing) and apply overrides from `env`
    pub fn load_from<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match path {
            Some(p) if p.exists() => {
                let data = fs::read_to_string(p)?;
                info!(path = %p.display(), "Loaded settings");
                serde_json::from_str(&data)?
            }
            Some(p) => {
                debug!(path = %p.display(), "Settings file does not exist, using defaults");
                Settings::default()
            }
            None => Settings::default(),
        };

        if let Some(dir) = non_empty(env(ENV_DATA_DIR)) {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty(env(ENV_BASELINE)) {
            settings.baseline_path = Some(PathBuf::from(path));
        }
        if let Some(url) = non_empty(env(ENV_ANALYSIS_URL)) {
            settings.analysis_url = Some(url);
        }
        if let Some(raw) = non_empty(env(ENV_ANALYSIS_TIMEOUT)) {
            settings.analysis_timeout_seconds = match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: ENV_ANALYSIS_TIMEOUT,
                        value: raw,
                    })
                }
            };
        }
        if settings.analysis_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                var: "analysis_timeout_seconds",
                value: "0".to_string(),
            });
        }

        Ok(settings)
    }

    /// Directory backing the key-value store
    pub fn kv_dir(&self) -> PathBuf {
        self.data_dir.join("kv")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_data_dir() -> PathBuf {
    let mut base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("civicloop");
    base
}
