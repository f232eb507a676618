//! Configuration file loading and validation
//!
//! The file is TOML with two tables. `[General]` holds the broker settings and
//! optionally the full topic lists:
//!
//! ```toml
//! [General]
//! mqttHost = "broker.local"
//! mqttPort = 1883
//! toggleTopics = ["house/lights/kitchen/toggle", "house/lights/hall/toggle"]
//! statusTopics = ["house/lights/kitchen/status", "house/lights/hall/status"]
//! ```
//!
//! `[Topics]` is the terse form. Each `topic-N` short name is expanded into a
//! toggle and a status topic below `topicBase`:
//!
//! ```toml
//! [Topics]
//! topicBase = "house/lights"
//! topic-1 = "kitchen"
//! topic-2 = "hall"
//! ```
//!
//! An explicit list in `[General]` takes precedence over the terse form for
//! that list.
//!
//! INI-style files with unquoted values and comma-separated lists, such as
//! `mqttHost=broker` or `toggleTopics=a/toggle,b/toggle`, are not accepted and
//! fail to load as malformed. Strings have to be quoted and lists written as
//! TOML arrays.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::channel::CHANNEL_COUNT;
use crate::mqtt::config::{MqttConfig, DEFAULT_PORT};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/relayboard-control.rc";

const DEFAULT_TOGGLE_ENDPOINT: &str = "toggle";
const DEFAULT_STATUS_ENDPOINT: &str = "status";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No MQTT host configured")]
    MissingHost,

    #[error("No toggle topics configured")]
    NoToggleTopics,
}

/// Toggle and status topics as parallel lists. Position `i` belongs to channel `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicBinding {
    pub toggle_topics: Vec<String>,
    pub status_topics: Vec<String>,
}

impl TopicBinding {
    /// Expands per-channel short names into `base/ + name + /endpoint` for both lists
    pub fn from_short_names(
        base: &str,
        short_names: &[String],
        toggle_endpoint: &str,
        status_endpoint: &str,
    ) -> Self {
        let base = normalize_base(base);
        let toggle_endpoint = normalize_endpoint(toggle_endpoint, DEFAULT_TOGGLE_ENDPOINT);
        let status_endpoint = normalize_endpoint(status_endpoint, DEFAULT_STATUS_ENDPOINT);

        Self {
            toggle_topics: short_names
                .iter()
                .map(|name| format!("{base}{name}{toggle_endpoint}"))
                .collect(),
            status_topics: short_names
                .iter()
                .map(|name| format!("{base}{name}{status_endpoint}"))
                .collect(),
        }
    }
}

fn normalize_base(base: &str) -> String {
    if base.is_empty() || base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}

fn normalize_endpoint(endpoint: &str, default: &str) -> String {
    let endpoint = if endpoint.is_empty() { default } else { endpoint };
    if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub topics: TopicBinding,
}

impl Config {
    /// Reads and validates the file at `path`. Any failure means the bridge must not start.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Reading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let config = file.into_config();
        config.validate()?;

        info!(
            "Our MQTT host is {}:{} with {} toggle topics",
            config.mqtt.host,
            config.mqtt.port,
            config.topics.toggle_topics.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.topics.toggle_topics.is_empty() {
            return Err(ConfigError::NoToggleTopics);
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(rename = "General")]
    general: Option<GeneralGroup>,
    #[serde(rename = "Topics")]
    topics: Option<TopicsGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeneralGroup {
    toggle_topics: Option<Vec<String>>,
    status_topics: Option<Vec<String>>,
    mqtt_host: String,
    mqtt_port: Option<u16>,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicsGroup {
    #[serde(default)]
    topic_base: String,
    #[serde(default)]
    toggle_endpoint: String,
    #[serde(default)]
    status_endpoint: String,
    #[serde(flatten)]
    entries: HashMap<String, toml::Value>,
}

impl TopicsGroup {
    /// `topic-1`, `topic-2`, ... up to the first missing or empty entry
    fn short_names(&self) -> Vec<String> {
        (1..=CHANNEL_COUNT)
            .map(|n| {
                self.entries
                    .get(&format!("topic-{n}"))
                    .and_then(toml::Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default()
            })
            .take_while(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn binding(&self) -> TopicBinding {
        TopicBinding::from_short_names(
            &self.topic_base,
            &self.short_names(),
            &self.toggle_endpoint,
            &self.status_endpoint,
        )
    }
}

impl ConfigFile {
    fn into_config(self) -> Config {
        let general = self.general.unwrap_or_default();
        let terse = self.topics.as_ref().map(TopicsGroup::binding).unwrap_or_default();

        let toggle_topics = match general.toggle_topics {
            Some(topics) => {
                debug!("Found toggle topics in the configuration: {:?}", topics);
                topics
            }
            None => terse.toggle_topics,
        };
        let status_topics = match general.status_topics {
            Some(topics) => {
                debug!("Found status topics in the configuration: {:?}", topics);
                topics
            }
            None => terse.status_topics,
        };

        let username = general.mqtt_username.filter(|name| !name.is_empty());
        let password = username.as_ref().and(general.mqtt_password);

        Config {
            mqtt: MqttConfig {
                host: general.mqtt_host.trim().to_string(),
                port: general.mqtt_port.unwrap_or(DEFAULT_PORT),
                username,
                password,
                ..MqttConfig::default()
            },
            topics: TopicBinding {
                toggle_topics,
                status_topics,
            },
        }
    }
}
