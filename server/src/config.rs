//! Server Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::permissions::PermissionConfig;

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default tracing filter when `RUST_LOG` is unset (default: "campus_server=info")
    pub log_filter: String,

    /// Emit JSON log lines instead of human-readable ones (default: false)
    pub log_json: bool,

    /// JSON snapshot of channels, memberships, bindings and overrides
    pub snapshot_path: Option<PathBuf>,

    /// Permission cache settings
    pub permissions: PermissionConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_filter: env::var("LOG_FILTER").unwrap_or_else(|_| "campus_server=info".into()),
            log_json: match env::var("LOG_JSON") {
                Ok(v) => v
                    .parse()
                    .with_context(|| format!("LOG_JSON must be true or false, got {v:?}"))?,
                Err(_) => false,
            },
            snapshot_path: env::var("PERMISSION_SNAPSHOT").ok().map(PathBuf::from),
            permissions: PermissionConfig::from_env(),
        })
    }

    /// Snapshot path, required by the CLI.
    pub fn require_snapshot_path(&self) -> Result<&PathBuf> {
        self.snapshot_path
            .as_ref()
            .context("PERMISSION_SNAPSHOT must be set")
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            log_filter: "campus_server=debug".into(),
            log_json: false,
            snapshot_path: None,
            permissions: PermissionConfig::default(),
        }
    }
}
