use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::error::DecodeError;
use crate::core::function::{Capability, FunctionCore};
use crate::core::naming::Component;

/// Presentation hints advertised with the sensor's discovery document.
///
/// Valid `device_class` and `state_class` values are defined by Home
/// Assistant's sensor integration. Unset fields are left out of discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_display_precision: Option<u32>,
}

impl SensorAttributes {
    /// Degrees Celsius with one decimal.
    pub fn temperature() -> Self {
        SensorAttributes {
            device_class: Some("temperature".to_string()),
            state_class: Some("measurement".to_string()),
            unit_of_measurement: Some("°C".to_string()),
            suggested_display_precision: Some(1),
        }
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }

    pub fn with_state_class(mut self, state_class: impl Into<String>) -> Self {
        self.state_class = Some(state_class.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measurement = Some(unit.into());
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.suggested_display_precision = Some(precision);
        self
    }
}

/// A reading as it is reported to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for SensorValue {
    fn from(value: bool) -> Self {
        SensorValue::Bool(value)
    }
}

impl From<i32> for SensorValue {
    fn from(value: i32) -> Self {
        SensorValue::Int(value.into())
    }
}

impl From<i64> for SensorValue {
    fn from(value: i64) -> Self {
        SensorValue::Int(value)
    }
}

impl From<f32> for SensorValue {
    fn from(value: f32) -> Self {
        SensorValue::Float(value.into())
    }
}

impl From<f64> for SensorValue {
    fn from(value: f64) -> Self {
        SensorValue::Float(value)
    }
}

impl From<String> for SensorValue {
    fn from(value: String) -> Self {
        SensorValue::Text(value)
    }
}

impl From<&str> for SensorValue {
    fn from(value: &str) -> Self {
        SensorValue::Text(value.to_string())
    }
}

/// A read-only measurement. Nothing is published until the first reading.
#[derive(Debug)]
pub struct Sensor {
    core: FunctionCore,
    attributes: SensorAttributes,
    value: Option<SensorValue>,
}

impl Sensor {
    pub fn new(name: impl Into<String>, attributes: SensorAttributes) -> Self {
        Sensor {
            core: FunctionCore::new(name),
            attributes,
            value: None,
        }
    }

    pub fn attributes(&self) -> &SensorAttributes {
        &self.attributes
    }

    /// Last reading, `None` until [`update`](Self::update) has been called.
    pub fn value(&self) -> Option<&SensorValue> {
        self.value.as_ref()
    }

    pub fn update(&mut self, value: impl Into<SensorValue>) {
        self.value = Some(value.into());
        self.publish_status();
    }
}

impl Capability for Sensor {
    fn core(&self) -> &FunctionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FunctionCore {
        &mut self.core
    }

    fn component(&self) -> Component {
        Component::Sensor
    }

    fn subscribe_topics(&self) -> Vec<String> {
        Vec::new()
    }

    fn discovery_payload(&self) -> Value {
        let mut document = json!({
            "name": self.core.name(),
            "unique_id": self.core.unique_id(),
            "state_topic": self.core.topic("state"),
            "value_template": "{{ value_json.value }}",
        });
        if let (Value::Object(fields), Ok(Value::Object(hints))) =
            (&mut document, serde_json::to_value(&self.attributes))
        {
            fields.extend(hints);
        }
        document
    }

    fn handle_message(&mut self, topic: &str, _payload: &[u8]) -> Result<(), DecodeError> {
        debug!("Sensor {} ignores message on {}", self.core.name(), topic);
        Ok(())
    }

    fn publish_status(&self) {
        match &self.value {
            Some(value) => self.core.publish_logged("state", &json!({ "value": value })),
            None => debug!("Sensor {} has no reading yet", self.core.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn temperature_sensor_discovery() {
        let mut sensor = Sensor::new("Outside", SensorAttributes::temperature());
        sensor.core_mut().attach("abc_weather");
        assert!(sensor.subscribe_topics().is_empty());
        assert_eq!(
            sensor.discovery_topic(),
            "homeassistant/sensor/abc_weather/outside/config"
        );
        assert_eq!(
            sensor.discovery_payload(),
            json!({
                "name": "Outside",
                "unique_id": "abc_weather_outside",
                "state_topic": "home/abc_weather/outside/state",
                "value_template": "{{ value_json.value }}",
                "device_class": "temperature",
                "state_class": "measurement",
                "unit_of_measurement": "°C",
                "suggested_display_precision": 1,
            })
        );
    }

    #[test]
    fn unset_attributes_are_omitted() {
        let mut sensor = Sensor::new("Door", SensorAttributes::default().with_device_class("door"));
        sensor.core_mut().attach("abc_hall");
        let doc = sensor.discovery_payload();
        assert_eq!(doc["device_class"], "door");
        assert!(doc.get("unit_of_measurement").is_none());
    }

    #[test]
    fn reading_starts_unknown() {
        let mut sensor = Sensor::new("Outside", SensorAttributes::temperature());
        assert_eq!(sensor.value(), None);
        assert!(sensor.handle_message("home/x/outside/set", b"12").is_ok());
        assert_eq!(sensor.value(), None);

        sensor.update(21.5);
        assert_eq!(sensor.value(), Some(&SensorValue::Float(21.5)));
        sensor.update("dry");
        assert_eq!(sensor.value(), Some(&SensorValue::Text("dry".into())));
    }

    #[test]
    fn values_serialize_untagged() {
        assert_eq!(serde_json::to_value(SensorValue::from(3)).unwrap(), json!(3));
        assert_eq!(serde_json::to_value(SensorValue::from(true)).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(SensorValue::from("x")).unwrap(), json!("x"));
    }
}
