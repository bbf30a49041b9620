use rumqttc::{MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// QoS requested for every topic filter (0, 1 or 2).
    pub subscribe_qos: u8,
    /// QoS of relayed commands (0, 1 or 2).
    pub publish_qos: u8,
    /// Capacity of the client request queue. Publishes beyond it are rejected
    /// while the network loop is not draining, so keep it at least as large as
    /// `bridge.event_capacity`.
    pub request_capacity: usize,
    /// Keep polling after a connection loss and re-subscribe on every reconnect.
    pub reconnect: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "brutus-bridge".to_string(),
            keep_alive_secs: 60,
            subscribe_qos: 0,
            publish_qos: 0,
            request_capacity: 256,
            reconnect: false,
        }
    }
}

pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

impl MqttConfig {
    pub fn subscribe_qos_level(&self) -> Option<QoS> {
        qos_from_level(self.subscribe_qos)
    }

    pub fn publish_qos_level(&self) -> Option<QoS> {
        qos_from_level(self.publish_qos)
    }

    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels() {
        let mut config = MqttConfig::default();
        assert_eq!(config.subscribe_qos_level(), Some(QoS::AtMostOnce));
        assert_eq!(config.publish_qos_level(), Some(QoS::AtMostOnce));

        config.subscribe_qos = 1;
        config.publish_qos = 2;
        assert_eq!(config.subscribe_qos_level(), Some(QoS::AtLeastOnce));
        assert_eq!(config.publish_qos_level(), Some(QoS::ExactlyOnce));

        config.publish_qos = 3;
        assert_eq!(config.publish_qos_level(), None);
    }

    #[test]
    fn options_carry_keep_alive() {
        let config = MqttConfig {
            keep_alive_secs: 30,
            ..MqttConfig::default()
        };
        let options = config.options();
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }
}
