//! Device → bus classification.
//!
//! Every device seen on the broker is filed under exactly one port bucket in the
//! mirror. The groups come from the `[[routing.port]]` tables of the settings
//! file; devices that appear in no group land in [`UNKNOWN_PORT`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved bucket for devices that no group claims.
pub const UNKNOWN_PORT: &str = "Unknown";

/// One bus label and the device ids wired to it.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PortGroup {
    pub name: String,
    pub devices: Vec<String>,
}

impl PortGroup {
    fn new(name: &str, devices: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            devices: devices.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Serialized form of the routing table, as found under `[routing]`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RoutingConfig {
    #[serde(rename = "port")]
    pub ports: Vec<PortGroup>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            ports: vec![
                PortGroup::new("RS-485-2", &["A1", "A2", "A3", "A4"]),
                PortGroup::new("RS-485-1", &["Climate_Living_room", "Warm_floor_WC_1"]),
                PortGroup::new(
                    "Virtual",
                    &["bedside_switch", "shutter_living_room", "Cardholder"],
                ),
                PortGroup::new("System", &["wb-gpio"]),
            ],
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Device {device} is listed under both {first} and {second}")]
    DuplicateDevice {
        device: String,
        first: String,
        second: String,
    },

    #[error("Port name {0} is reserved for unrouted devices")]
    ReservedPort(String),
}

/// Lookup index built from a [`RoutingConfig`].
#[derive(Clone, Debug)]
pub struct RoutingTable {
    index: HashMap<String, String>,
}

impl RoutingTable {
    pub fn from_config(config: &RoutingConfig) -> Result<Self, RoutingError> {
        let mut index: HashMap<String, String> = HashMap::new();

        for group in &config.ports {
            if group.name == UNKNOWN_PORT {
                return Err(RoutingError::ReservedPort(group.name.clone()));
            }
            for device in &group.devices {
                if let Some(existing) = index.get(device) {
                    // Listing a device twice in the same group is harmless.
                    if existing != &group.name {
                        return Err(RoutingError::DuplicateDevice {
                            device: device.clone(),
                            first: existing.clone(),
                            second: group.name.clone(),
                        });
                    }
                }
                index.insert(device.clone(), group.name.clone());
            }
        }

        Ok(Self { index })
    }

    /// Returns the bus label for `device`, or [`UNKNOWN_PORT`].
    pub fn route(&self, device: &str) -> &str {
        self.index
            .get(device)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_PORT)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        let mut index = HashMap::new();
        for group in RoutingConfig::default().ports {
            for device in group.devices {
                index.insert(device, group.name.clone());
            }
        }
        Self { index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_groups_route_to_their_bus() {
        let table = RoutingTable::default();

        for device in ["A1", "A2", "A3", "A4"] {
            assert_eq!(table.route(device), "RS-485-2");
        }
        for device in ["Climate_Living_room", "Warm_floor_WC_1"] {
            assert_eq!(table.route(device), "RS-485-1");
        }
        for device in ["bedside_switch", "shutter_living_room", "Cardholder"] {
            assert_eq!(table.route(device), "Virtual");
        }
        assert_eq!(table.route("wb-gpio"), "System");
    }

    #[test]
    fn unlisted_devices_are_unknown() {
        let table = RoutingTable::default();
        assert_eq!(table.route("A5"), UNKNOWN_PORT);
        assert_eq!(table.route("a1"), UNKNOWN_PORT);
        assert_eq!(table.route(""), UNKNOWN_PORT);
    }

    #[test]
    fn from_default_config_matches_default_table() {
        let table = RoutingTable::from_config(&RoutingConfig::default()).unwrap();
        assert_eq!(table.route("Cardholder"), "Virtual");
        assert_eq!(table.route("wb-gpio"), "System");
    }

    #[test]
    fn device_in_two_groups_is_rejected() {
        let config = RoutingConfig {
            ports: vec![
                PortGroup::new("RS-485-1", &["A1"]),
                PortGroup::new("RS-485-2", &["A1"]),
            ],
        };
        assert_eq!(
            RoutingTable::from_config(&config).unwrap_err(),
            RoutingError::DuplicateDevice {
                device: "A1".into(),
                first: "RS-485-1".into(),
                second: "RS-485-2".into(),
            }
        );
    }

    #[test]
    fn unknown_cannot_be_configured_as_a_port() {
        let config = RoutingConfig {
            ports: vec![PortGroup::new(UNKNOWN_PORT, &["A1"])],
        };
        assert!(matches!(
            RoutingTable::from_config(&config),
            Err(RoutingError::ReservedPort(_))
        ));
    }
}
