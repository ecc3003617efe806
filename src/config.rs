//! Settings of the bundled agent, read from a TOML file.
//!
//! ```toml
//! poll_interval_ms = 100
//!
//! [broker]
//! host = "broker.lan"
//! username = "hass"
//! password = "secret"
//!
//! [device]
//! name = "Garden Pump"
//! unique_id = "garden-shed"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::Result;
use crate::mqtt::MqttConfig;

pub const CONFIG_DIR: &str = "hass-mqtt-device";
pub const CONFIG_FILE: &str = "config.toml";
const MACHINE_ID_PATH: &str = "/etc/machine-id";
const FALLBACK_UNIQUE_ID: &str = "hass_mqtt_device";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// How long each `process_messages` call may block.
    pub poll_interval_ms: u64,
    pub broker: MqttConfig,
    pub device: DeviceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            broker: MqttConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    /// Falls back to the machine id when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Simple Switch".to_string(),
            unique_id: None,
        }
    }
}

impl DeviceConfig {
    pub fn resolve_unique_id(&self) -> String {
        if let Some(id) = self.unique_id.as_ref().filter(|id| !id.trim().is_empty()) {
            return id.clone();
        }
        read_machine_id(Path::new(MACHINE_ID_PATH)).unwrap_or_else(|| {
            warn!("No unique id configured and no machine id found, using {}", FALLBACK_UNIQUE_ID);
            FALLBACK_UNIQUE_ID.to_string()
        })
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Reading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads `path`, writing the defaults there first if it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        info!("No config at {}, writing defaults", path.display());
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// `<config dir>/hass-mqtt-device/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }
}

fn read_machine_id(path: &Path) -> Option<String> {
    let id = fs::read_to_string(path).ok()?;
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[broker]\nhost = \"broker.lan\"\n\n[device]\nname = \"Garden Pump\"\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.broker.host, "broker.lan");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.device.name, "Garden Pump");
        assert_eq!(config.device.unique_id, None);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn missing_file_is_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let written = AppConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(AppConfig::load(&path).unwrap(), written);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[broker\nhost = ").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(Error::ConfigParse(_))));
        assert!(matches!(
            AppConfig::load(&dir.path().join("absent.toml")),
            Err(Error::ConfigIo(_))
        ));
    }

    #[test]
    fn unique_id_prefers_configured_value() {
        let device = DeviceConfig {
            name: "x".into(),
            unique_id: Some("shed".into()),
        };
        assert_eq!(device.resolve_unique_id(), "shed");
    }

    #[test]
    fn machine_id_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine-id");
        fs::write(&path, "0123abcd\n").unwrap();
        assert_eq!(read_machine_id(&path).as_deref(), Some("0123abcd"));

        fs::write(&path, "\n").unwrap();
        assert_eq!(read_machine_id(&path), None);
        assert_eq!(read_machine_id(&dir.path().join("absent")), None);
    }

    #[test]
    fn default_path_ends_with_config_file() {
        let path = AppConfig::default_path();
        assert!(path.ends_with(Path::new(CONFIG_DIR).join(CONFIG_FILE)));
    }
}
