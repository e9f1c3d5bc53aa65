use crate::domain::models::ScanMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output of the bridge's tracing subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `gatt_bridge=debug`
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    /// One of `daily`, `hourly`, `minutely` or `never`
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_true(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "gatt_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // Connection behaviour
    /// Discover services as soon as a connection comes up
    #[serde(default = "default_false")]
    pub auto_discover_services: bool,
    /// Cache policy of the automatic discovery
    #[serde(default = "default_true")]
    pub discover_use_cache: bool,

    // GATT request handling
    /// Also write the CCCD when notifications are toggled
    #[serde(default = "default_true")]
    pub write_cccd_on_notification: bool,
    #[serde(default = "default_max_pending_requests")]
    pub max_pending_requests: usize,
    /// Fail an operation whose completion callback has not arrived after
    /// this many milliseconds; 0 waits forever
    #[serde(default)]
    pub request_timeout_ms: u64,
    /// Upper bound on how long `shutdown` waits for pending requests
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    // Scanning
    #[serde(default)]
    pub default_scan_mode: ScanMode,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            auto_discover_services: default_false(),
            discover_use_cache: default_true(),
            write_cccd_on_notification: default_true(),
            max_pending_requests: default_max_pending_requests(),
            request_timeout_ms: 0,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            default_scan_mode: ScanMode::default(),
        }
    }
}

fn default_max_pending_requests() -> usize {
    64
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

impl BridgeSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

pub struct SettingsService {
    settings: BridgeSettings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load settings from the user's config directory, falling back to defaults
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults
    pub fn with_path(settings_path: impl Into<PathBuf>) -> Self {
        let settings_path = settings_path.into();
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                BridgeSettings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("GattBridge");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<BridgeSettings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut BridgeSettings {
        &mut self.settings
    }
}
