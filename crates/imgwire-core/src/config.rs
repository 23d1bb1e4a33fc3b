//! Transfer configuration.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $IMGWIRE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/imgwire/config.toml
//!   3. ~/.config/imgwire/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::wire::{
    CONTINUATION_TIMEOUT_SECS, HANDSHAKE_TIMEOUT_SECS, HEARTBEAT_SECS, MAX_MESSAGE_BYTES,
    POLL_INTERVAL_MS,
};

/// Timing and size limits for one transfer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// How long to wait for the peer's first message.
    pub handshake_timeout_secs: u64,
    /// How long to wait for the next image once a session has started.
    pub continuation_timeout_secs: u64,
    /// Granularity of every wait loop.
    pub poll_interval_ms: u64,
    /// Heartbeat period while waiting. 0 = silent.
    pub heartbeat_secs: u64,
    /// Largest single transport message accepted or produced.
    pub max_message_bytes: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: HANDSHAKE_TIMEOUT_SECS,
            continuation_timeout_secs: CONTINUATION_TIMEOUT_SECS,
            poll_interval_ms: POLL_INTERVAL_MS,
            heartbeat_secs: HEARTBEAT_SECS,
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }
}

impl TransferConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn continuation_timeout(&self) -> Duration {
        Duration::from_secs(self.continuation_timeout_secs)
    }

    /// Never zero, so wait loops always make progress.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_secs > 0).then(|| Duration::from_secs(self.heartbeat_secs))
    }

    /// Same config with both timeouts replaced.
    pub fn with_timeouts(mut self, handshake_secs: u64, continuation_secs: u64) -> Self {
        self.handshake_timeout_secs = handshake_secs;
        self.continuation_timeout_secs = continuation_secs;
        self
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("imgwire")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TransferConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read the file at `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(TransferConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("IMGWIRE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists at `path`. Returns the path.
    pub fn write_default_if_missing(path: &Path) -> Result<PathBuf, ConfigError> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
            }
            let text = toml::to_string_pretty(&TransferConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(path, text)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        Ok(path.to_path_buf())
    }

    /// Apply IMGWIRE_* overrides. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("IMGWIRE_HANDSHAKE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.handshake_timeout_secs = v;
        }
        if let Some(v) = lookup("IMGWIRE_CONTINUATION_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.continuation_timeout_secs = v;
        }
        if let Some(v) = lookup("IMGWIRE_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = v;
        }
    }
}
