//! Configuration file handling with TOML support.

use crate::scheduler::OverlapPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Tone and message settings
    #[serde(default)]
    pub notifications: NotifyConfig,

    /// Where state is persisted
    #[serde(default)]
    pub storage: StorageConfig,

    /// Ticker catalog for symbol search
    #[serde(default)]
    pub search: SearchConfig,

    /// FinViz credentials
    #[serde(default)]
    pub finviz: FinvizConfig,
}

/// Which quote service to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Yahoo,
    Finviz,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Seconds between refresh cycles
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: f64,

    /// Seconds before the first refresh cycle
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,

    /// API timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// What to do when a tick arrives while a cycle is still running
    #[serde(default)]
    pub overlap: OverlapPolicy,

    /// Quote provider
    #[serde(default)]
    pub provider: ProviderKind,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            initial_delay: default_initial_delay(),
            timeout: default_timeout(),
            overlap: OverlapPolicy::default(),
            provider: ProviderKind::default(),
        }
    }
}

fn default_refresh_interval() -> f64 {
    4.0
}
fn default_initial_delay() -> f64 {
    1.0
}
fn default_timeout() -> u64 {
    10
}

/// Notification settings, handed to the notifier explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Master switch for tones and messages
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tone volume from 0.0 to 1.0. Terminal bells have no loudness
    /// control, so 0.0 mutes and anything else rings.
    #[serde(default = "default_volume")]
    pub volume: f64,

    /// Times each tone repeats
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
            repeat: default_repeat(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_volume() -> f64 {
    0.8
}
fn default_repeat() -> u32 {
    3
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory holding watchlist.json and alerts.json
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured directory, or the platform data directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|p| p.join("rangetop")))
            .unwrap_or_else(|| PathBuf::from(".rangetop"))
    }
}

/// Symbol search settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    /// Files listing one ticker per line, searched in order
    #[serde(default)]
    pub ticker_files: Vec<PathBuf>,
}

/// FinViz settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FinvizConfig {
    /// Elite export token; `FINVIZ_API_KEY` takes precedence
    #[serde(default)]
    pub auth: String,
}

impl FinvizConfig {
    pub fn resolve_auth(&self) -> String {
        std::env::var("FINVIZ_API_KEY").unwrap_or_else(|_| self.auth.clone())
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from default location or create default.
    pub fn load_or_default() -> Self {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return config,
                    Err(e) => warn!(error = %e, "failed to load config, using defaults"),
                }
            }
        }
        Config::default()
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rangetop").join("config.toml"))
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

/// Generate a sample configuration file content.
pub fn sample_config() -> &'static str {
    r##"# rangetop configuration file
# Price-band alerts for a small watchlist

[general]
# Seconds between refresh cycles (minimum 1)
refresh_interval = 4.0
# Seconds before the first refresh after start-up
initial_delay = 1.0
# API timeout in seconds
timeout = 10
# Ticks arriving while a refresh is still running:
# "allow" starts another cycle anyway, "single-flight" skips the tick
overlap = "allow"
# Quote provider: "yahoo" or "finviz"
provider = "yahoo"

[notifications]
enabled = true
# 0.0 mutes tones
volume = 0.8
# Times each tone repeats
repeat = 3

[storage]
# Defaults to the platform data directory
# data_dir = "/home/me/.local/share/rangetop"

[search]
# One ticker per line, an optional "Ticker" header line is skipped
ticker_files = []

[finviz]
# Export token, or set FINVIZ_API_KEY
auth = ""
"##
}
