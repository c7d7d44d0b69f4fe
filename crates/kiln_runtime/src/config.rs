//! Host configuration
//!
//! # Sources (in priority order)
//!
//! 1. Environment: `KILN_MODULE_DIR`, `KILN_MODULE_NAME`, `KILN_DEBUG`
//! 2. Config file: first CLI argument, else `kiln.toml` in the working directory
//! 3. Defaults
//!
//! # Example Config File
//!
//! ```toml
//! [module]
//! directory = "target/debug"
//! name = "kiln_game"
//!
//! [reload]
//! preserve_state = true
//! settle_delay_ms = 100
//! max_load_attempts = 3
//! debounce_ms = 300
//!
//! [host]
//! updates_per_second = 60
//! frames_per_second = 60
//! debug = false
//! ```

use crate::error::{Result, RuntimeError};
use kiln_hotload::{module_path, ReloadConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked for when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "kiln.toml";

/// Where the game module lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Directory holding the canonical module file
    pub directory: PathBuf,
    /// Module name without platform prefix or extension
    pub name: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            name: "kiln_game".to_string(),
        }
    }
}

/// Main loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Fixed update rate
    pub updates_per_second: u32,
    /// Headless frame rate
    pub frames_per_second: u32,
    /// Enable debug logging
    pub debug: bool,
    /// Noise seed; random per run when unset
    pub noise_seed: Option<u32>,
    /// Noise sampling frequency
    pub noise_frequency: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            updates_per_second: 60,
            frames_per_second: 60,
            debug: false,
            noise_seed: None,
            noise_frequency: 0.1,
        }
    }
}

/// Complete host configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    pub module: ModuleConfig,
    pub reload: ReloadConfig,
    pub host: HostConfig,
    /// File this was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl KilnConfig {
    /// Load from all sources
    ///
    /// An explicitly named file must exist; the default `kiln.toml` is
    /// optional.
    pub fn load(explicit_path: Option<PathBuf>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load_from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load_from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| RuntimeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content).map_err(|source| RuntimeError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply environment overrides, reading variables through `var`
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("KILN_MODULE_DIR").filter(|v| !v.is_empty()) {
            self.module.directory = PathBuf::from(dir);
        }

        if let Some(name) = var("KILN_MODULE_NAME").filter(|v| !v.is_empty()) {
            self.module.name = name;
        }

        if let Some(debug) = var("KILN_DEBUG") {
            self.host.debug = debug.is_empty() || debug == "1" || debug.eq_ignore_ascii_case("true");
        }
    }

    /// Reject settings the host loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.module.name.is_empty() {
            return Err(RuntimeError::ConfigInvalid("module.name is empty".into()));
        }
        if self.host.updates_per_second == 0 {
            return Err(RuntimeError::ConfigInvalid(
                "host.updates_per_second must be at least 1".into(),
            ));
        }
        if self.host.frames_per_second == 0 {
            return Err(RuntimeError::ConfigInvalid(
                "host.frames_per_second must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Canonical module file
    pub fn module_path(&self) -> PathBuf {
        module_path(&self.module.directory, &self.module.name)
    }

    /// Log a summary
    pub fn print_summary(&self) {
        match &self.source {
            Some(path) => log::info!("Config: {}", path.display()),
            None => log::info!("Config: defaults"),
        }
        log::info!("  Module: {}", self.module_path().display());
        log::info!(
            "  Reload: watch={} preserve_state={} settle={}ms attempts={}",
            self.reload.watch,
            self.reload.preserve_state,
            self.reload.settle_delay_ms,
            self.reload.load_attempts()
        );
        log::info!(
            "  Host: {} updates/s, {} frames/s, debug={}",
            self.host.updates_per_second,
            self.host.frames_per_second,
            self.host.debug
        );
    }
}
