//! Configuration for district-supply

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("district-supply")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite ledger
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port for the approval surface
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Vehicle assigned to a transfer whose recommendation names none.
    /// Business policy, not a parsing fallback.
    #[serde(default = "default_vehicle")]
    pub default_vehicle: String,

    /// When set, a nested `item_requested` value is only taken as an item id
    /// if it starts with this prefix (e.g. "ITM")
    #[serde(default)]
    pub item_id_prefix: Option<String>,

    /// Classification given to inventory rows first created by a credit
    #[serde(default = "default_neutral_status")]
    pub neutral_status: String,

    /// How long a decision waits for the ledger write lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum cards returned by the approval queue
    #[serde(default = "default_queue_limit")]
    pub queue_limit: u32,
}

fn default_http_port() -> u16 {
    8095
}

fn default_vehicle() -> String {
    "BIKE".to_string()
}

fn default_neutral_status() -> String {
    "Healthy".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_queue_limit() -> u32 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            default_vehicle: default_vehicle(),
            item_id_prefix: None,
            neutral_status: default_neutral_status(),
            busy_timeout_ms: default_busy_timeout_ms(),
            queue_limit: default_queue_limit(),
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

    /// Get ledger database path
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("supply.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    /// Normalizer settings derived from this config
    pub fn normalizer(&self) -> crate::normalize::NormalizerConfig {
        crate::normalize::NormalizerConfig {
            default_vehicle: self.default_vehicle.clone(),
            item_id_prefix: self.item_id_prefix.clone(),
        }
    }
}
