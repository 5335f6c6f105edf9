//! Client configuration
//!
//! A JSON file overlaid by `QUMAIL_*` environment variables. Every field has
//! a default so an empty `{}` is a valid file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use qumail_crypto::kdf::{DEFAULT_ITERATIONS, MAX_ITERATIONS};
use qumail_keys::quantum::DEFAULT_MAX_KEY_BYTES;
use qumail_keys::DEFAULT_KEY_MANAGER_URL;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::level::{EncryptionMethod, SecurityLevel};

pub const ENV_KM_URL: &str = "QUMAIL_KM_URL";
pub const ENV_KEM_URL: &str = "QUMAIL_KEM_URL";
pub const ENV_DIRECTORY_URL: &str = "QUMAIL_DIRECTORY_URL";
pub const ENV_TIMEOUT_SECS: &str = "QUMAIL_TIMEOUT_SECS";
pub const ENV_KDF_ITERATIONS: &str = "QUMAIL_KDF_ITERATIONS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Cannot build client: {0}")]
    Endpoint(#[from] qumail_keys::EndpointError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub key_manager_url: String,
    /// Falls back to the key manager URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kem_authority_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_url: Option<String>,
    pub timeout_secs: u64,
    pub kdf_iterations: u32,
    pub max_quantum_key_bytes: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_manager_url: DEFAULT_KEY_MANAGER_URL.to_string(),
            kem_authority_url: None,
            directory_url: None,
            timeout_secs: 20,
            kdf_iterations: DEFAULT_ITERATIONS,
            max_quantum_key_bytes: DEFAULT_MAX_KEY_BYTES,
        }
    }
}

impl CryptoConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file means defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(io_err)
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_KM_URL) {
            self.key_manager_url = url;
        }
        if let Some(url) = lookup(ENV_KEM_URL) {
            self.kem_authority_url = Some(url);
        }
        if let Some(url) = lookup(ENV_DIRECTORY_URL) {
            self.directory_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_env(ENV_TIMEOUT_SECS, value)?;
        }
        if let Some(value) = lookup(ENV_KDF_ITERATIONS) {
            self.kdf_iterations = parse_env(ENV_KDF_ITERATIONS, value)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if !(1..=MAX_ITERATIONS).contains(&self.kdf_iterations) {
            return Err(ConfigError::Invalid {
                field: "kdf_iterations",
                reason: format!("must be between 1 and {}", MAX_ITERATIONS),
            });
        }
        if self.max_quantum_key_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_quantum_key_bytes",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Quantum keys are only recoverable by another process through the
    /// directory's metadata store.
    pub fn check_shareable(
        &self,
        level: SecurityLevel,
        method: EncryptionMethod,
    ) -> Result<(), ConfigError> {
        if level.uses_method() && method == EncryptionMethod::Qkd && self.directory_url.is_none() {
            return Err(ConfigError::Invalid {
                field: "directory_url",
                reason: format!(
                    "level {} qkd envelopes cannot be opened by anyone without a directory",
                    level
                ),
            });
        }
        Ok(())
    }

    pub fn kem_url(&self) -> &str {
        self.kem_authority_url
            .as_deref()
            .unwrap_or(&self.key_manager_url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
