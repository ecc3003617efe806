//! Expose switches, lights, numbers, sensors and HVAC units to Home Assistant
//! through MQTT discovery.
//!
//! ```no_run
//! use std::time::Duration;
//! use hass_mqtt_device::{Connector, Device, MqttConfig, Switch};
//!
//! # fn main() -> hass_mqtt_device::Result<()> {
//! let mut device = Device::new("Pump", "garden-shed");
//! device.register_function(Switch::new("Pump", |on| println!("pump -> {on}")))?;
//!
//! let mut connector = Connector::new(MqttConfig::new("broker.lan", 1883, "", ""));
//! let id = connector.register_device(device)?;
//! let _ = connector.connect();
//! loop {
//!     connector.process_messages(Duration::from_millis(100), false);
//!     # let _ = id;
//! }
//! # }
//! ```

pub mod config;
pub mod core;
pub mod devices;
pub mod functions;
pub mod mqtt;

pub use crate::core::{
    Capability, Connector, DecodeError, Device, DeviceId, Error, Function, LinkState, Result,
};
pub use crate::functions::{
    DimmableLight, Hvac, HvacAction, HvacFeature, HvacFeatures, HvacUpdate, Number, OnOffLight,
    Sensor, SensorAttributes, SensorValue, Switch,
};
pub use crate::mqtt::{BrokerClient, MemoryBroker, MqttConfig};
