//! # Persistence Module
//!
//! Holds the device-state mirror: the canonical snapshot of every control value
//! the bridge has seen, grouped by bus (port), then device, then control.
//!
//! ```text
//! {
//!     "RS-485-2": { "A1": { "Relay_1": "1", "Relay_2": false } },
//!     "Unknown":  { "wb-adc": { "Vin": "12.1" } }
//! }
//! ```
//!
//! ## Write Paths
//! Two writers touch the same file with different typing rules:
//! - **Broker path**: payloads are stored verbatim as strings.
//! - **UI path**: user text is coerced with [`ControlValue::coerce`] first, so
//!   `"true"` becomes a JSON boolean and `"42"` a JSON integer.
//!
//! Both representations are valid mirror content and survive a reload unchanged.
//!
//! ## File Handling
//! Ports, devices and controls keep the order they were read or first set in,
//! which is the order the configuration UI displays them. New entries are
//! appended. The file is rewritten in full after every mutation. The rewrite is not atomic;
//! a crash mid-write leaves a truncated file that fails to decode on the next
//! start ([`MirrorError::Decode`]).

pub mod mirror_store;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use mirror_store::MirrorError;

/// A single control value. JSON representation is untagged.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ControlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ControlValue {
    /// Applies the configuration UI's coercion rules to user-entered text.
    ///
    /// `true`/`false`/`null` match case-insensitively. Numbers with no fractional
    /// part become integers. Non-finite numbers stay text since JSON cannot carry
    /// them.
    pub fn coerce(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "true" => return ControlValue::Bool(true),
            "false" => return ControlValue::Bool(false),
            "null" => return ControlValue::Null,
            _ => {}
        }

        match raw.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => {
                if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
                    ControlValue::Integer(number as i64)
                } else {
                    ControlValue::Float(number)
                }
            }
            _ => ControlValue::Text(raw.to_string()),
        }
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        ControlValue::Text(value.to_string())
    }
}

impl From<String> for ControlValue {
    fn from(value: String) -> Self {
        ControlValue::Text(value)
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlValue::Null => write!(f, "null"),
            ControlValue::Bool(b) => write!(f, "{}", b),
            ControlValue::Integer(i) => write!(f, "{}", i),
            ControlValue::Float(x) => write!(f, "{}", x),
            ControlValue::Text(s) => write!(f, "{}", s),
        }
    }
}

pub type Controls = IndexMap<String, ControlValue>;
pub type Devices = IndexMap<String, Controls>;

/// Port → device → control → value.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct ConfigMirror {
    ports: IndexMap<String, Devices>,
}

impl ConfigMirror {
    /// Overwrites one control, creating the port and device buckets when absent.
    pub fn set(
        &mut self,
        port: &str,
        device: &str,
        control: &str,
        value: impl Into<ControlValue>,
    ) {
        self.ports
            .entry(port.to_string())
            .or_default()
            .entry(device.to_string())
            .or_default()
            .insert(control.to_string(), value.into());
    }

    pub fn get(&self, port: &str, device: &str, control: &str) -> Option<&ControlValue> {
        self.ports.get(port)?.get(device)?.get(control)
    }

    /// Number of stored control values across all ports.
    pub fn len(&self) -> usize {
        self.ports
            .values()
            .flat_map(|devices| devices.values())
            .map(|controls| controls.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
