//! Configuration file handling for dsearch.
//!
//! Manages configuration stored in `~/.config/dsearch/config.toml` (or
//! platform equivalent).
//!
//! ## Example Config File
//!
//! ```toml
//! [quota]
//! free_quota = 10
//!
//! [store]
//! product_ids = ["app.dsearch.unlimited.monthly"]
//!
//! [receipt]
//! shared_secret = "..."
//!
//! [output]
//! default_format = "human"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::receipt::{PRODUCTION_VERIFY_URL, SANDBOX_VERIFY_URL};
use crate::store::DEFAULT_PRODUCT_ID;
use crate::usage::DEFAULT_FREE_QUOTA;

// Config file format version; bump on breaking structure changes.
const CONFIG_VERSION: u32 = 1;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: '{value}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("No usable config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Root configuration for dsearch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsearchConfig {
    /// Config file format version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Free quota settings
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Store / subscription settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Receipt validation settings
    #[serde(default)]
    pub receipt: ReceiptConfig,

    /// Output format settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Free-quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Number of free searches before the gate closes
    #[serde(default = "default_free_quota")]
    pub free_quota: u32,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Product ids to offer; the first loaded offering is purchased
    #[serde(default = "default_product_ids")]
    pub product_ids: Vec<String>,
}

/// Receipt validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptConfig {
    /// Primary (production) verification endpoint
    #[serde(default = "default_primary_url")]
    pub primary_url: String,

    /// Secondary (sandbox) verification endpoint
    #[serde(default = "default_sandbox_url")]
    pub sandbox_url: String,

    /// Shared secret sent with the verification payload
    #[serde(default)]
    pub shared_secret: String,

    /// Path of the locally stored receipt blob (None = default location)
    #[serde(default)]
    pub receipt_path: Option<PathBuf>,
}

/// Output format configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human" or "json"
    #[serde(default = "default_format")]
    pub default_format: String,
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_free_quota() -> u32 {
    DEFAULT_FREE_QUOTA
}

fn default_product_ids() -> Vec<String> {
    vec![DEFAULT_PRODUCT_ID.to_string()]
}

fn default_primary_url() -> String {
    PRODUCTION_VERIFY_URL.to_string()
}

fn default_sandbox_url() -> String {
    SANDBOX_VERIFY_URL.to_string()
}

fn default_format() -> String {
    "human".to_string()
}

impl Default for DsearchConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            quota: QuotaConfig::default(),
            store: StoreConfig::default(),
            receipt: ReceiptConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_quota: default_free_quota(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            product_ids: default_product_ids(),
        }
    }
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            primary_url: default_primary_url(),
            sandbox_url: default_sandbox_url(),
            shared_secret: String::new(),
            receipt_path: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
        }
    }
}

// =============================================================================
// Load / Save
// =============================================================================

impl DsearchConfig {
    /// Default config file path (`~/.config/dsearch/config.toml` or
    /// platform equivalent).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dsearch")
            .join("config.toml")
    }

    /// Default directory for state files (usage counter, stub ledger).
    pub fn state_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dsearch")
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    ///
    /// Returns default configuration if the file doesn't exist or can't be
    /// parsed.
    pub fn load_from(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<Self>(&content) {
                Ok(config) => {
                    tracing::debug!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config {:?}: {}, using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("No config file at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Set a configuration value by dotted key, e.g.
    /// `quota.free_quota=20`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "quota.free_quota" => {
                self.quota.free_quota =
                    value.parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        expected: "non-negative integer".to_string(),
                    })?;
            }
            "store.product_ids" => {
                self.store.product_ids =
                    value.split(',').map(|s| s.trim().to_string()).collect();
            }
            "receipt.primary_url" => self.receipt.primary_url = value.to_string(),
            "receipt.sandbox_url" => self.receipt.sandbox_url = value.to_string(),
            "receipt.shared_secret" => self.receipt.shared_secret = value.to_string(),
            "receipt.receipt_path" => self.receipt.receipt_path = Some(PathBuf::from(value)),
            "output.default_format" => {
                if !matches!(value, "human" | "json") {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        expected: "human or json".to_string(),
                    });
                }
                self.output.default_format = value.to_string();
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// List all configuration values as (key, value) pairs.
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            (
                "quota.free_quota".to_string(),
                self.quota.free_quota.to_string(),
            ),
            (
                "store.product_ids".to_string(),
                self.store.product_ids.join(","),
            ),
            (
                "receipt.primary_url".to_string(),
                self.receipt.primary_url.clone(),
            ),
            (
                "receipt.sandbox_url".to_string(),
                self.receipt.sandbox_url.clone(),
            ),
            (
                "receipt.shared_secret".to_string(),
                if self.receipt.shared_secret.is_empty() {
                    "(unset)".to_string()
                } else {
                    "(set)".to_string()
                },
            ),
            (
                "receipt.receipt_path".to_string(),
                self.receipt
                    .receipt_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(default)".to_string()),
            ),
            (
                "output.default_format".to_string(),
                self.output.default_format.clone(),
            ),
        ]
    }
}
