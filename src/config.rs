//! Configuration for parcel-box

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parcel-box")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the local cache database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub claim: ClaimConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Background push retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote push attempts per write, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Remote pushes taking longer are abandoned and left to the retry task
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,

    /// Capacity of the change feed behind `observe_packages`
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Claim transaction retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// Attempts before a contended claim surfaces as `ClaimFailed`
    #[serde(default = "default_claim_attempts")]
    pub max_attempts: u32,

    /// Length of generated claim codes
    #[serde(default = "default_code_length")]
    pub code_length: usize,
}

/// Notification ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Candidates at or above this confidence are inserted without asking
    #[serde(default = "default_auto_insert_threshold")]
    pub auto_insert_threshold: f64,

    /// Oldest unconfirmed candidates are dropped beyond this many
    #[serde(default = "default_max_pending_candidates")]
    pub max_pending_candidates: usize,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_push_timeout_ms() -> u64 {
    5_000
}

fn default_event_capacity() -> usize {
    256
}

fn default_claim_attempts() -> u32 {
    5
}

fn default_code_length() -> usize {
    6
}

fn default_auto_insert_threshold() -> f64 {
    0.8
}

fn default_max_pending_candidates() -> usize {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            push_timeout_ms: default_push_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SyncConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_claim_attempts(),
            code_length: default_code_length(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            auto_insert_threshold: default_auto_insert_threshold(),
            max_pending_candidates: default_max_pending_candidates(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            sync: SyncConfig::default(),
            claim: ClaimConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get cache database path
    pub fn cache_db_path(&self) -> PathBuf {
        self.storage_dir.join("cache.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
