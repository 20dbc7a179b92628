//! Configuration for the log store
//!
//! Static settings (`LogConfig`) are serializable and can be loaded from a
//! TOML file; runtime filter state (`LogFilter`) is shared, thread-safe and
//! re-read on every emit so the host can flip logging on and off at any time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::level::Level;

/// Marker substring for rate-limited diagnostic chatter; messages carrying it
/// are dropped unless `enable_rc_log` is set
pub const RC_MARKER: &str = "{rc}";

/// Maximum size of the day file before a truncating rotation (10 MiB)
pub const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default retention window for old day files
pub const DEFAULT_MAX_AGE_HOURS: u64 = 24;

/// Descriptive metadata written at the top of every freshly created log file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderInfo {
    /// Application version string
    pub app_version: String,
    /// Device brand
    pub brand: String,
    /// Device model
    pub model: String,
    /// Device manufacturer
    pub manufacturer: String,
    /// OS version identifier
    pub os_version: String,
    /// CPU ABI identifier
    pub abi: String,
}

/// Static log store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory holding the day-named log files
    pub logs_dir: PathBuf,

    /// Tag used on the platform logging channel
    #[serde(default = "default_app_tag")]
    pub app_tag: String,

    /// Size ceiling in bytes triggering a truncating rotation
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Day files older than this many hours are swept at startup
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    /// Keep messages carrying the `{rc}` marker instead of suppressing them
    #[serde(default)]
    pub enable_rc_log: bool,

    /// Accept integer-leveled lines forwarded from the native layer
    #[serde(default)]
    pub enable_native_log: bool,

    /// Metadata for the header block
    #[serde(default)]
    pub header: HeaderInfo,
}

fn default_app_tag() -> String {
    "chatlog".to_string()
}

fn default_max_file_size() -> u64 {
    MAX_LOG_FILE_SIZE
}

fn default_max_age_hours() -> u64 {
    DEFAULT_MAX_AGE_HOURS
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            app_tag: default_app_tag(),
            max_file_size: default_max_file_size(),
            max_age_hours: default_max_age_hours(),
            enable_rc_log: false,
            enable_native_log: false,
            header: HeaderInfo::default(),
        }
    }
}

impl LogConfig {
    /// Load configuration from a TOML file, or defaults if it doesn't exist
    pub fn load(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// The retention window as a duration
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 60 * 60)
    }
}

/// Default logs directory: `~/.chatlog/logs`
pub fn default_logs_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatlog")
        .join("logs")
}

/// Runtime filter state, shared between the host and the store
///
/// Both fields are atomics: the enabled flag is re-read on every emit and on
/// every background append, and the minimum level takes effect for the next
/// emit after a store.
#[derive(Debug)]
pub struct LogFilter {
    enabled: AtomicBool,
    minimum_level: AtomicU8,
}

impl LogFilter {
    /// Create a filter with the given initial enabled state; the minimum
    /// level defaults to `Debug`
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            minimum_level: AtomicU8::new(Level::Debug.priority()),
        }
    }

    /// Whether logging is currently enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable all logging
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// The current minimum level
    pub fn minimum_level(&self) -> Level {
        Level::from_priority(self.minimum_level.load(Ordering::Relaxed)).unwrap_or(Level::Debug)
    }

    /// Update the minimum level; takes effect for subsequent emits
    pub fn set_minimum_level(&self, level: Level) {
        self.minimum_level.store(level.priority(), Ordering::Relaxed);
    }

    /// Whether a record at `level` passes the threshold right now
    pub fn passes(&self, level: Level) -> bool {
        self.is_enabled() && level >= self.minimum_level()
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self::new(true)
    }
}
