use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest keep-alive interval the client accepts.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Broker address, credentials and session tuning for one connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Client id presented to the broker. Must be unique per broker.
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// How long `connect` waits for the broker's acknowledgement.
    pub connect_timeout_ms: u64,
    /// Capacity of the request queue between the client and its network loop.
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: format!("hass_mqtt_device_{}", std::process::id()),
            keep_alive_secs: 30,
            connect_timeout_ms: 5000,
            channel_capacity: 100,
        }
    }
}

impl MqttConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: MqttConfig = toml::from_str("host = \"broker.lan\"").unwrap();
        assert_eq!(config.host, "broker.lan");
        assert_eq!(config.port, 1883);
        assert_eq!(config.channel_capacity, 100);
        assert!(!config.has_credentials());
    }

    #[test]
    fn keep_alive_has_a_floor() {
        let config = MqttConfig {
            keep_alive_secs: 1,
            ..MqttConfig::default()
        };
        assert_eq!(config.keep_alive(), Duration::from_secs(5));
    }
}
