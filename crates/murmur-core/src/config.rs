//! Configuration system for Murmur.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MURMUR_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/murmur/config.toml
//!   3. ~/.config/murmur/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cipher::CipherMode;
use crate::wire::{DEFAULT_GREETING, HEARTBEAT_INTERVAL_SECS, PROTOCOL_ID};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub network: NetworkConfig,
    pub broadcast: BroadcastConfig,
    pub session: SessionConfig,
    pub cipher: CipherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the stream transport listens on. Port 0 = OS-assigned.
    pub listen_addr: String,
    /// Port for the HTTP control surface (bound to 127.0.0.1).
    pub api_port: u16,
    /// Protocol identifier checked on every stream.
    pub protocol: String,
    /// Addresses to dial once at startup.
    pub dial: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub heartbeat_interval_ms: u64,
    /// Upper bound on one dial + write to one peer.
    pub send_timeout_ms: u64,
    pub greeting: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inbound stream bodies larger than this are dropped.
    pub max_message_bytes: usize,
    /// Received messages kept for the API. Oldest evicted first.
    pub inbox_capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    pub mode: CipherMode,
    /// 32-byte key, hex. Random per process when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_hex: Option<String>,
    /// 16-byte IV, hex. Random per process when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv_hex: Option<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:0".to_string(),
            api_port: 8000,
            protocol: PROTOCOL_ID.to_string(),
            dial: Vec::new(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_SECS * 1000,
            send_timeout_ms: 10_000,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 1024 * 1024,
            inbox_capacity: 256,
        }
    }
}

impl BroadcastConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("murmur")
}

fn dirs_or_home() -> PathBuf {
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

impl MurmurConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = Self::load_file(&path)?;
        config.apply_env_overrides(|k| std::env::var(k).ok());
        Ok(config)
    }

    /// Parse a config file, falling back to defaults if it does not exist.
    pub fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(MurmurConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MURMUR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &std::path::Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(&MurmurConfig::default())
            .map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply MURMUR_* overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("MURMUR_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(v) = lookup("MURMUR_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Some(v) = lookup("MURMUR_NETWORK__DIAL") {
            self.network.dial = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("MURMUR_BROADCAST__HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.broadcast.heartbeat_interval_ms = ms;
            }
        }
        if let Some(v) = lookup("MURMUR_CIPHER__MODE") {
            if let Ok(mode) = v.parse() {
                self.cipher.mode = mode;
            }
        }
        if let Some(v) = lookup("MURMUR_CIPHER__KEY_HEX") {
            self.cipher.key_hex = Some(v);
        }
        if let Some(v) = lookup("MURMUR_CIPHER__IV_HEX") {
            self.cipher.iv_hex = Some(v);
        }
    }
}
