//! Configuration for the notice board server.
//!
//! All configuration is loaded from environment variables.
//! No secrets are logged.

use crate::store::CorruptDataPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Which backing store serves reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// JSON files on local disk
    Local,
    /// Document store with a change feed (drives push notifications)
    Remote,
}

impl StorageMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(StorageMode::Local),
            "remote" => Some(StorageMode::Remote),
            _ => None,
        }
    }

    pub fn is_remote(self) -> bool {
        self == StorageMode::Remote
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// Server port
    pub port: u16,

    // === Storage ===
    /// Initial backing store, unless a persisted setting overrides it
    pub storage_mode: StorageMode,

    /// Directory for the local store files and persisted settings
    pub data_dir: PathBuf,

    /// What to do when a local store file cannot be parsed
    pub corrupt_data_policy: CorruptDataPolicy,

    // === Background work ===
    /// Interval between reconciliation sweeps (default: 5 minutes)
    pub reconcile_interval: Duration,

    // === Push ===
    /// APNS credentials; `None` disables push delivery
    pub apns: Option<ApnsConfig>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            storage_mode: std::env::var("STORAGE_MODE")
                .ok()
                .and_then(|s| StorageMode::parse(&s))
                .unwrap_or(StorageMode::Remote),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            corrupt_data_policy: std::env::var("CORRUPT_DATA_POLICY")
                .ok()
                .and_then(|s| CorruptDataPolicy::parse(&s))
                .unwrap_or_default(),

            reconcile_interval: Duration::from_secs(
                std::env::var("RECONCILE_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300), // 5 minutes
            ),

            apns: ApnsConfig::from_env(),
        }
    }

    /// Configuration for tests: local data under `data_dir`, no push.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>, storage_mode: StorageMode) -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            storage_mode,
            data_dir: data_dir.into(),
            corrupt_data_policy: CorruptDataPolicy::default(),
            reconcile_interval: Duration::from_secs(300),
            apns: None,
        }
    }

    /// File holding the persisted storage-mode switch
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

/// Token-based (.p8) APNS credentials.
#[derive(Debug, Clone)]
pub struct ApnsConfig {
    pub team_id: String,
    pub key_id: String,
    /// Path to the private key file
    pub key_path: PathBuf,
    /// App bundle id, sent as the push topic
    pub bundle_id: String,
    /// Development gateway instead of production
    pub sandbox: bool,
}

impl ApnsConfig {
    /// Present only when all four `APNS_*` credentials are set.
    fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Some(Self {
            team_id: var("APNS_TEAM_ID")?,
            key_id: var("APNS_KEY_ID")?,
            key_path: PathBuf::from(var("APNS_KEY_PATH")?),
            bundle_id: var("APNS_BUNDLE_ID")?,
            sandbox: var("APNS_SANDBOX").map_or(true, |v| v == "true" || v == "1"),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
