//! Configuration management for lockstep.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`LOCKSTEP_TIME_UNIT_MS`)
//! 2. Project-local config file (`./lockstep.toml`)
//! 3. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # lockstep.toml
//!
//! # Base time unit in milliseconds for sleep and timing assertions.
//! # Raise this on heavily loaded CI machines.
//! time_unit_ms = 120
//! ```

use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::timing::DEFAULT_TIME_UNIT;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// lockstep configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base time unit in milliseconds.
    /// Scales all `sleep` and `time x..y` arguments in scripts.
    pub time_unit_ms: Option<u64>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `lockstep.toml`
    /// 3. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Get the base time unit, with fallback to the default.
    pub fn time_unit(&self) -> Duration {
        self.time_unit_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIME_UNIT)
    }

    /// Merge another config into this one (other takes priority).
    fn merge(&mut self, other: Config) {
        if other.time_unit_ms.is_some() {
            self.time_unit_ms = other.time_unit_ms;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("LOCKSTEP_TIME_UNIT_MS") {
            match value.parse() {
                Ok(ms) => self.time_unit_ms = Some(ms),
                Err(_) => {
                    log::warn!("Ignoring invalid LOCKSTEP_TIME_UNIT_MS value: {}", value)
                }
            }
        }
    }

    /// Load project-local configuration from ./lockstep.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("lockstep.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        // Try the manifest directory when running under cargo
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("lockstep.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }
}
