//! Settings file and the application context built from it.
//!
//! Settings are TOML. Every section is optional; omitted keys fall back to the
//! stock `/usr/Brutus` layout and a broker on `localhost:1883`.
//!
//! ```toml
//! [mqtt]
//! host = "localhost"
//! port = 1883
//! keep_alive_secs = 60
//! subscribe_qos = 0
//! publish_qos = 0
//! request_capacity = 256
//!
//! [bridge]
//! event_capacity = 256
//!
//! [paths]
//! mirror = "/usr/Brutus/conf.json"
//! pipe = "/usr/Brutus/test_pipe"
//!
//! [relay]
//! require_valid_command = false
//!
//! [[routing.port]]
//! name = "RS-485-2"
//! devices = ["A1", "A2", "A3", "A4"]
//! ```

use crate::mqtt::config::{qos_from_level, MqttConfig};
use crate::routing::{RoutingConfig, RoutingError, RoutingTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_DIR: &str = "brutus-bridge";
const CONFIG_FILE: &str = "bridge.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub mirror: PathBuf,
    pub pipe: PathBuf,
    pub topics: PathBuf,
    pub log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            mirror: PathBuf::from("/usr/Brutus/conf.json"),
            pipe: PathBuf::from("/usr/Brutus/test_pipe"),
            topics: PathBuf::from("/usr/Brutus/topics.txt"),
            log: PathBuf::from("/usr/Brutus/mqtt_logs.log"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// Only publish pipe lines that match `<port>/<device>/<control> <value>`.
    pub require_valid_command: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Events (broker messages and pipe lines) buffered ahead of the actor.
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub mqtt: MqttConfig,
    pub bridge: BridgeConfig,
    pub paths: PathsConfig,
    pub relay: RelayConfig,
    pub routing: RoutingConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid routing table: {0}")]
    Routing(#[from] RoutingError),

    #[error("Invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

impl Settings {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `explicit` when given (it must exist), otherwise the per-user
    /// settings file if present, otherwise the defaults. Also returns the file
    /// the settings came from, if any.
    pub async fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
                _ => return Ok((Self::default(), None)),
            },
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
        let settings = Self::from_toml(&content, &path)?;
        Ok((settings, Some(path)))
    }
}

/// `$XDG_CONFIG_HOME/brutus-bridge/bridge.toml` or the platform equivalent.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Everything the components need, validated once at startup and passed down
/// explicitly.
///
/// Nothing is logged while the context is built: the subscriber is installed
/// later, from the settings themselves. [`AppContext::log_startup`] reports
/// afterwards.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub settings: Settings,
    pub routing: RoutingTable,
    /// Settings file in use; `None` means built-in defaults.
    pub source: Option<PathBuf>,
}

impl AppContext {
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let mqtt = &settings.mqtt;
        for level in [mqtt.subscribe_qos, mqtt.publish_qos] {
            if qos_from_level(level).is_none() {
                return Err(ConfigError::InvalidQos(level));
            }
        }

        if mqtt.request_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("mqtt.request_capacity"));
        }
        if settings.bridge.event_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("bridge.event_capacity"));
        }

        let routing = RoutingTable::from_config(&settings.routing)?;
        Ok(Self {
            settings,
            routing,
            source: None,
        })
    }

    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (settings, source) = Settings::load(explicit).await?;
        let mut ctx = Self::from_settings(settings)?;
        ctx.source = source;
        Ok(ctx)
    }

    /// Where the settings came from, plus anything suspicious in them. Call once
    /// logging is up.
    pub fn log_startup(&self) {
        match &self.source {
            Some(path) => info!("Loaded settings from {}", path.display()),
            None => info!("No settings file found, using defaults"),
        }

        let request_capacity = self.settings.mqtt.request_capacity;
        let event_capacity = self.settings.bridge.event_capacity;
        if request_capacity < event_capacity {
            warn!(
                "mqtt.request_capacity ({}) is below bridge.event_capacity ({}), pipe bursts may be rejected",
                request_capacity, event_capacity
            );
        }
    }
}
