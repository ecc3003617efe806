//! A device groups functions under one discovery identity and one
//! availability topic.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::core::error::{DecodeError, Error, Result};
use crate::core::function::{Capability, Function};
use crate::core::naming;
use crate::core::session::SessionLink;
use crate::mqtt::LastWill;

/// Template Home Assistant uses to read the availability payloads.
const AVAILABILITY_TEMPLATE: &str = "{{ value_json.availability }}";

/// The `device` block attached to every discovery document of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub identifiers: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

/// A collection of functions announced to the hub as one device.
///
/// `full_id` is `<sanitized unique id>_<clean name>`, so one machine can host
/// several devices under the same unique id.
#[derive(Debug)]
pub struct Device {
    name: String,
    clean_name: String,
    unique_id: String,
    full_id: String,
    functions: Vec<Function>,
    session: SessionLink,
}

impl Device {
    pub fn new(name: impl Into<String>, unique_id: impl Into<String>) -> Self {
        let name = name.into();
        let unique_id = unique_id.into();
        let clean_name = naming::sanitize(&name);
        let full_id = format!("{}_{}", naming::sanitize(&unique_id), clean_name);
        Device {
            name,
            clean_name,
            unique_id,
            full_id,
            functions: Vec::new(),
            session: SessionLink::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clean_name(&self) -> &str {
        &self.clean_name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn full_id(&self) -> &str {
        &self.full_id
    }

    pub fn availability_topic(&self) -> String {
        naming::availability_topic(&self.full_id)
    }

    /// Whether the device is registered with a live connector.
    pub fn is_attached(&self) -> bool {
        self.session.is_attached()
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Adds a function. Names must stay unique after sanitizing.
    ///
    /// Functions added after the device was registered are announced on the
    /// next connect.
    pub fn register_function(&mut self, function: impl Into<Function>) -> Result<()> {
        let mut function = function.into();
        if self
            .functions
            .iter()
            .any(|f| f.clean_name() == function.clean_name())
        {
            error!(
                "Device {} already has a function named {}",
                self.name,
                function.clean_name()
            );
            return Err(Error::DuplicateCapability {
                device: self.name.clone(),
                name: function.name().to_string(),
            });
        }

        let core = function.core_mut();
        core.attach(&self.full_id);
        core.bind(self.session.clone());
        debug!("Registered function {} on device {}", function.name(), self.name);
        self.functions.push(function);
        Ok(())
    }

    /// Looks a function up by its name or its sanitized name.
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.name() == name || f.clean_name() == name)
    }

    pub fn find_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions
            .iter_mut()
            .find(|f| f.name() == name || f.clean_name() == name)
    }

    /// All command topics of the device.
    pub fn subscribe_topics(&self) -> Result<BTreeSet<String>> {
        let mut topics = BTreeSet::new();
        for topic in self.functions.iter().flat_map(|f| f.subscribe_topics()) {
            if topics.contains(&topic) {
                error!("Duplicate topic {} found for device {}", topic, self.name);
                return Err(Error::DuplicateTopic {
                    device: self.name.clone(),
                    topic,
                });
            }
            topics.insert(topic);
        }
        Ok(topics)
    }

    /// Hands a command to the function addressed by the topic's function segment.
    pub fn route_message(&mut self, topic: &str, payload: &[u8]) -> std::result::Result<(), DecodeError> {
        let (full_id, clean_name, _) =
            naming::split_topic(topic).ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;
        if full_id != self.full_id {
            return Err(DecodeError::UnknownTopic(topic.to_string()));
        }
        let function = self
            .functions
            .iter_mut()
            .find(|f| f.clean_name() == clean_name)
            .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;
        function.handle_message(topic, payload)
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.name.clone(),
            identifiers: vec![self.full_id.clone()],
            manufacturer: "Homebrew".to_string(),
            model: "hass_mqtt_device".to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Discovery topic and document of every function, in registration order.
    pub fn discovery_messages(&self) -> Result<Vec<(String, Value)>> {
        let device = serde_json::to_value(self.device_info())?;
        let availability_topic = self.availability_topic();
        let mut seen = BTreeSet::new();
        let mut messages = Vec::with_capacity(self.functions.len());

        for function in &self.functions {
            let topic = function.discovery_topic();
            if !seen.insert(topic.clone()) {
                error!("Duplicate discovery topic {} found for device {}", topic, self.name);
                return Err(Error::DuplicateDiscoveryTopic {
                    device: self.name.clone(),
                    topic,
                });
            }
            let mut document = function.discovery_payload();
            if let Value::Object(fields) = &mut document {
                fields.insert("device".into(), device.clone());
                fields.insert("availability_topic".into(), availability_topic.clone().into());
                fields.insert("availability_template".into(), AVAILABILITY_TEMPLATE.into());
            }
            messages.push((topic, document));
        }
        Ok(messages)
    }

    /// Publishes every discovery document.
    ///
    /// Stops at the first failure. Documents published before it stay on the
    /// broker.
    pub fn publish_discovery(&self) -> Result<()> {
        for (topic, document) in self.discovery_messages()? {
            debug!("Sending discovery message to {}", topic);
            self.session.publish(&topic, &document).map_err(|e| {
                error!(
                    "Failed to send discovery for device {}-{}: {}",
                    self.name, self.unique_id, e
                );
                e
            })?;
        }
        info!("Sent discovery for device {}", self.name);
        Ok(())
    }

    /// Marks the device online, then republishes every function's state.
    pub fn publish_status(&self) {
        self.session
            .publish_logged(&self.availability_topic(), &availability(true));
        for function in &self.functions {
            function.publish_status();
        }
    }

    /// The offline marker the broker publishes if this session dies.
    pub fn last_will(&self) -> LastWill {
        LastWill {
            topic: self.availability_topic(),
            payload: availability(false).to_string().into_bytes(),
            retain: true,
        }
    }

    pub(crate) fn publish_offline(&self) {
        self.session
            .publish_logged(&self.availability_topic(), &availability(false));
    }

    pub(crate) fn bind(&mut self, session: SessionLink) {
        for function in &mut self.functions {
            function.core_mut().bind(session.clone());
        }
        self.session = session;
    }
}

fn availability(online: bool) -> Value {
    json!({ "availability": if online { "online" } else { "offline" } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{Hvac, HvacFeatures, Sensor, SensorAttributes, Switch};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn pump() -> Device {
        let mut device = Device::new("Pump", "abc");
        device.register_function(Switch::new("Pump", |_| {})).unwrap();
        device
    }

    #[test]
    fn full_id_combines_unique_id_and_name() {
        let device = Device::new("Living Room", "ABC-123");
        assert_eq!(device.full_id(), "abc_123_living_room");
        assert_eq!(device.availability_topic(), "home/abc_123_living_room/availability");
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let mut device = pump();
        let err = device
            .register_function(Switch::new("PUMP!", |_| {}))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCapability { .. }));
        assert_eq!(device.functions().len(), 1);
    }

    #[test]
    fn find_by_name_or_clean_name() {
        let mut device = Device::new("Kitchen", "abc");
        device
            .register_function(Sensor::new("Fridge Temp", SensorAttributes::temperature()))
            .unwrap();
        assert!(device.find_function("Fridge Temp").is_some());
        assert!(device.find_function("fridge_temp").is_some());
        assert!(device.find_function("freezer").is_none());
    }

    #[test]
    fn routing_matches_whole_segments() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut device = Device::new("Garden", "abc");
        for name in ["Pump", "Pump Two"] {
            let sink = hits.clone();
            let label = name.to_string();
            device
                .register_function(Switch::new(name, move |s| {
                    sink.borrow_mut().push((label.clone(), s))
                }))
                .unwrap();
        }

        device
            .route_message("home/abc_garden/pump_two/set", b"ON")
            .unwrap();
        device
            .route_message("home/abc_garden/pump/set", b"OFF")
            .unwrap();
        assert_eq!(
            *hits.borrow(),
            vec![("Pump Two".to_string(), true), ("Pump".to_string(), false)]
        );

        assert!(device.route_message("home/abc_garden/pum/set", b"ON").is_err());
        assert!(device.route_message("home/other/pump/set", b"ON").is_err());
        assert!(device.route_message("home/abc_garden/availability", b"ON").is_err());
    }

    #[test]
    fn discovery_is_enriched_and_stable() {
        let device = pump();
        let first = device.discovery_messages().unwrap();
        let second = device.discovery_messages().unwrap();
        assert_eq!(first, second);

        let (topic, doc) = &first[0];
        assert_eq!(topic, "homeassistant/switch/abc_pump/pump/config");
        assert_eq!(doc["availability_topic"], "home/abc_pump/availability");
        assert_eq!(doc["availability_template"], AVAILABILITY_TEMPLATE);
        assert_eq!(
            doc["device"],
            json!({
                "name": "Pump",
                "identifiers": ["abc_pump"],
                "manufacturer": "Homebrew",
                "model": "hass_mqtt_device",
                "sw_version": env!("CARGO_PKG_VERSION"),
            })
        );
    }

    #[test]
    fn subscribe_topics_cover_all_functions() {
        let mut device = pump();
        device
            .register_function(Hvac::new(
                "Climate",
                |_, _| {},
                HvacFeatures::POWER_CONTROL | HvacFeatures::MODE_CONTROL,
            ))
            .unwrap();
        device
            .register_function(Sensor::new("Temp", SensorAttributes::temperature()))
            .unwrap();
        let topics: Vec<_> = device.subscribe_topics().unwrap().into_iter().collect();
        assert_eq!(
            topics,
            vec![
                "home/abc_pump/climate/mode/set",
                "home/abc_pump/climate/set",
                "home/abc_pump/pump/set",
            ]
        );
    }

    #[test]
    fn detached_discovery_fails() {
        assert!(matches!(
            pump().publish_discovery(),
            Err(Error::Detached(_))
        ));
    }

    #[test]
    fn last_will_marks_device_offline() {
        let will = pump().last_will();
        assert_eq!(will.topic, "home/abc_pump/availability");
        assert_eq!(
            serde_json::from_slice::<Value>(&will.payload).unwrap(),
            json!({"availability": "offline"})
        );
        assert!(will.retain);
    }
}
