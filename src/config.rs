//! Persistent CLI settings
//!
//! Stored as TOML at `~/.config/splitkb/config.toml`. Missing keys take their
//! defaults; command-line flags override whatever the file says.

use serde::{Deserialize, Serialize};
use splitkb_keyboard::store::DEFAULT_MAX_LAYERS;
use splitkb_keyboard::KeyboardVariant;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;

fn default_timeout_ms() -> u64 {
    1000
}

fn default_max_layers() -> usize {
    DEFAULT_MAX_LAYERS
}

fn default_keymap_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("splitkb")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Keyboard variant selecting matrix size and factory keymap
    #[serde(default)]
    pub variant: KeyboardVariant,

    /// Per-command response deadline
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of layers kept in the local keymap
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,

    /// Directory holding the per-variant keymap files
    #[serde(default = "default_keymap_dir")]
    pub keymap_dir: PathBuf,

    /// Start in demo mode
    #[serde(default)]
    pub demo: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            variant: KeyboardVariant::default(),
            timeout_ms: default_timeout_ms(),
            max_layers: default_max_layers(),
            keymap_dir: default_keymap_dir(),
            demo: false,
        }
    }
}

impl AppConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("splitkb")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply command-line overrides
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(variant) = cli.variant {
            self.variant = variant;
        }
        if let Some(ms) = cli.timeout_ms {
            self.timeout_ms = ms;
        }
        if cli.demo {
            self.demo = true;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
