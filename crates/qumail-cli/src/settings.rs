//! Files under `~/.qumail`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub fn qumail_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("No home directory")?
        .join(".qumail"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(qumail_dir()?.join("config.json"))
}

pub fn profile_path(config_path: &Path) -> PathBuf {
    config_path.with_file_name("profile.json")
}

/// Who this installation is. The private key lives in the OS keychain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub public_key_b64: String,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let profile = serde_json::from_str(&content)
            .with_context(|| format!("Invalid profile {}", path.display()))?;
        Ok(Some(profile))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
