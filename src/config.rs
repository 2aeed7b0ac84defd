//! TOML configuration for the engine and the gilrs runtime
//!
//! Read-only: the file is loaded at startup and never written back. A missing
//! file, or a missing field, falls back to defaults.
//!
//! ```toml
//! [engine]
//! idle_poll_interval_ms = 5
//! hotplug = true
//!
//! [runtime]
//! event_poll_interval_ms = 2
//!
//! [device]
//! name = "Xbox Wireless Controller"
//! serial = ""
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::device::{Descriptor, EngineSettings, GilrsSettings};

const CONFIG_DIR: &str = "padlink";
const CONFIG_FILE: &str = "padlink.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub idle_poll_interval_ms: u64,
    /// Whether runtime hotplug events are fed into the engine
    pub hotplug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval_ms: EngineSettings::default().idle_poll_interval_ms,
            hotplug: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_poll_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_poll_interval_ms: GilrsSettings::default().event_poll_interval_ms,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PadlinkConfig {
    pub engine: EngineConfig,
    pub runtime: RuntimeConfig,
    /// Device to open at startup
    pub device: Option<Descriptor>,
}

impl PadlinkConfig {
    /// `<config dir>/padlink/padlink.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path`, defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(path, &content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            idle_poll_interval_ms: self.engine.idle_poll_interval_ms,
        }
    }

    pub fn runtime_settings(&self) -> GilrsSettings {
        GilrsSettings {
            event_poll_interval_ms: self.runtime.event_poll_interval_ms,
        }
    }
}
