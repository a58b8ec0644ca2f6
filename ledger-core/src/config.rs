//! Configuration for the ledger

use crate::{exchange::DEFAULT_COMMON_DENOMINATOR, journal::DEFAULT_MAX_REVERSAL_DEPTH, storage::CommitMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Storage backend configuration
    pub storage: StorageConfig,

    /// Exchange rate configuration
    pub exchange: ExchangeConfig,

    /// Journal ledger configuration
    pub journal: JournalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "wallet-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            storage: StorageConfig::default(),
            exchange: ExchangeConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

/// Which storage backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Process-local, lost on exit
    Memory,
    /// RocksDB under `data_dir` (feature `rocksdb`)
    RocksDb,
}

impl std::str::FromStr for Backend {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Backend::Memory),
            "rocksdb" | "rocks_db" | "rocks" => Ok(Backend::RocksDb),
            other => Err(crate::Error::Config(format!("Unknown storage backend: {}", other))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend
    pub backend: Backend,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            data_dir: PathBuf::from("./data/ledger"),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,

    /// fsync every committed journal
    pub sync_writes: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
            sync_writes: true,
        }
    }
}

/// Exchange rate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Initial common denominator of the exchange rate table
    pub common_denominator: f64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            common_denominator: DEFAULT_COMMON_DENOMINATOR,
        }
    }
}

/// Journal ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Reversal links followed before a chain is declared inconsistent
    pub max_reversal_depth: usize,

    /// Commit strategy; the backend's own when unset
    pub commit_mode_override: Option<CommitMode>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            max_reversal_depth: DEFAULT_MAX_REVERSAL_DEPTH,
            commit_mode_override: None,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("LEDGER_BACKEND") {
            config.storage.backend = backend.parse()?;
        }

        if let Ok(denom) = std::env::var("LEDGER_COMMON_DENOM") {
            config.exchange.common_denominator = denom
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid LEDGER_COMMON_DENOM: {}", e)))?;
        }

        if let Ok(depth) = std::env::var("LEDGER_MAX_REVERSAL_DEPTH") {
            config.journal.max_reversal_depth = depth
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid LEDGER_MAX_REVERSAL_DEPTH: {}", e)))?;
        }

        if let Ok(addr) = std::env::var("LEDGER_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        Ok(config)
    }
}
