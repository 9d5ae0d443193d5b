//! # Terminal Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DEVICE_ID=POS-02                                             │
//! │     TALLY_DB_PATH=/srv/tally/tally.db                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/terminal.toml (Linux)                          │
//! │     ~/Library/Application Support/com.tally.pos/terminal.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "POS-01"
//! name = "Front Counter"
//!
//! [store]
//! name = "Corner Mart"
//!
//! [receipt]
//! mode = "auto"            # auto | manual
//!
//! [tender]
//! auto_settle = true       # settle as soon as the balance reaches zero
//!
//! [scale]
//! timeout_ms = 10000
//!
//! [holds]
//! order = "oldest_first"   # oldest_first | newest_first
//!
//! [paynow]
//! bank = "DBS"
//! account_name = "Corner Mart Pte Ltd"
//! account_number = "123-456789-0"
//!
//! [database]
//! path = "/var/lib/tally/tally.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use tally_core::events::PaynowVendor;
use tally_core::hold::HoldOrder;
use tally_core::register::{ReceiptMode, RegisterSettings};

use crate::error::{TerminalError, TerminalResult};

const CONFIG_FILE: &str = "terminal.toml";
const DB_FILE: &str = "tally.db";

/// Shortest scale window accepted; anything less cannot settle a reading.
const MIN_SCALE_TIMEOUT_MS: u64 = 100;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Terminal id. Its last two characters appear in receipt numbers.
    #[serde(default = "default_device_id")]
    pub id: String,

    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_id() -> String {
    "POS-01".to_string()
}

fn default_device_name() -> String {
    "POS Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: default_device_id(),
            name: default_device_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_name")]
    pub name: String,
}

fn default_store_name() -> String {
    "Tally Store".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            name: default_store_name(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptConfig {
    #[serde(default)]
    pub mode: ReceiptMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderConfig {
    /// Settle automatically once a confirmed tender brings the balance to zero.
    #[serde(default = "default_true")]
    pub auto_settle: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TenderConfig {
    fn default() -> Self {
        TenderConfig { auto_settle: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// How long a weigh request waits for a stable reading.
    #[serde(default = "default_scale_timeout")]
    pub timeout_ms: u64,
}

fn default_scale_timeout() -> u64 {
    10_000
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            timeout_ms: default_scale_timeout(),
        }
    }
}

impl ScaleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldsConfig {
    #[serde(default)]
    pub order: HoldOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaynowConfig {
    pub bank: String,
    pub account_name: String,
    pub account_number: String,
}

impl From<PaynowConfig> for PaynowVendor {
    fn from(config: PaynowConfig) -> Self {
        PaynowVendor {
            bank: config.bank,
            account_name: config.account_name,
            account_number: config.account_number,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Terminal Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub receipt: ReceiptConfig,

    #[serde(default)]
    pub tender: TenderConfig,

    #[serde(default)]
    pub scale: ScaleConfig,

    #[serde(default)]
    pub holds: HoldsConfig,

    /// PAYNOW QR details; no QR is shown when absent.
    #[serde(default)]
    pub paynow: Option<PaynowConfig>,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl TerminalConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`terminal.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> TerminalResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading terminal config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> TerminalResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> TerminalResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> TerminalResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(TerminalError::InvalidConfig(
                "device.id must not be empty".into(),
            ));
        }

        if self.scale.timeout_ms < MIN_SCALE_TIMEOUT_MS {
            return Err(TerminalError::InvalidConfig(format!(
                "scale.timeout_ms must be at least {}, got {}",
                MIN_SCALE_TIMEOUT_MS, self.scale.timeout_ms
            )));
        }

        if let Some(ref paynow) = self.paynow {
            if paynow.account_number.trim().is_empty() {
                return Err(TerminalError::InvalidConfig(
                    "paynow.account_number must not be empty".into(),
                ));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TALLY_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("TALLY_STORE_NAME") {
            self.store.name = name;
        }

        if let Ok(mode) = std::env::var("TALLY_RECEIPT_MODE") {
            match mode.to_lowercase().as_str() {
                "auto" => self.receipt.mode = ReceiptMode::Auto,
                "manual" => self.receipt.mode = ReceiptMode::Manual,
                _ => warn!(mode = %mode, "Unknown receipt mode in environment"),
            }
        }

        if let Ok(timeout) = std::env::var("TALLY_SCALE_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.scale.timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Invalid scale timeout in environment"),
            }
        }

        if let Ok(order) = std::env::var("TALLY_HOLD_ORDER") {
            match order.to_lowercase().as_str() {
                "oldest_first" => self.holds.order = HoldOrder::OldestFirst,
                "newest_first" => self.holds.order = HoldOrder::NewestFirst,
                _ => warn!(order = %order, "Unknown hold order in environment"),
            }
        }

        if let Ok(path) = std::env::var("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Database file: the configured path, else `tally.db` in the platform
    /// data directory (created if missing).
    pub fn database_path(&self) -> TerminalResult<PathBuf> {
        if let Some(ref path) = self.database.path {
            return Ok(path.clone());
        }

        let dirs =
            directories::ProjectDirs::from("com", "tally", "pos").ok_or(TerminalError::NoDataDir)?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join(DB_FILE))
    }

    /// Settings handed to the register.
    pub fn register_settings(&self) -> RegisterSettings {
        RegisterSettings {
            device_id: self.device.id.clone(),
            receipt_mode: self.receipt.mode,
            hold_order: self.holds.order,
            paynow: self.paynow.clone().map(PaynowVendor::from),
        }
    }
}
