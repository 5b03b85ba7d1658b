//! Session configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::storage::{FileTokenStorage, InMemoryTokenStorage, TokenStorage};

pub const TOKEN_PATH_ENV: &str = "LEARNHUB_TOKEN_PATH";
pub const TOKEN_LEEWAY_ENV: &str = "LEARNHUB_TOKEN_LEEWAY_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where tokens are persisted. `None` keeps them in memory only.
    pub token_path: Option<PathBuf>,

    /// Treat access tokens as expired this many seconds before `exp`.
    pub expiry_leeway_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_path: None,
            expiry_leeway_secs: 30,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidLeeway { key: &'static str, value: String },
}

impl SessionConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(TOKEN_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            config.token_path = Some(PathBuf::from(path));
        }

        if let Some(raw) = lookup(TOKEN_LEEWAY_ENV) {
            config.expiry_leeway_secs = raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs >= 0)
                .ok_or(ConfigError::InvalidLeeway {
                    key: TOKEN_LEEWAY_ENV,
                    value: raw.clone(),
                })?;
        }

        Ok(config)
    }

    pub fn leeway(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_leeway_secs.max(0))
    }

    /// Open the configured token storage, creating its directory if needed.
    pub fn open_storage(&self) -> anyhow::Result<Arc<dyn TokenStorage>> {
        let Some(path) = &self.token_path else {
            tracing::info!("no token path configured; tokens kept in memory");
            return Ok(Arc::new(InMemoryTokenStorage::new()));
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create token directory at {:?}", parent))?;
        }

        tracing::info!(path = %path.display(), "using file token storage");
        Ok(Arc::new(FileTokenStorage::new(path.clone())))
    }
}
