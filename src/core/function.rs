//! The capability contract shared by every function variant, and the closed
//! [`Function`] enum the device stores.
//!
//! A function is one unit of controllable or observable state on a device:
//! a light, a switch, a bounded number, a sensor or an HVAC unit. It knows its
//! topics and discovery document, decodes inbound commands for the owner's
//! control callback and republishes its own state on request.

use serde_json::Value;
use tracing::error;

use crate::core::error::{DecodeError, Error, Result};
use crate::core::naming::{self, Component};
use crate::core::session::SessionLink;
use crate::functions::{DimmableLight, Hvac, Number, OnOffLight, Sensor, Switch};

/// Identity and parent link common to all variants.
#[derive(Debug, Clone)]
pub struct FunctionCore {
    name: String,
    clean_name: String,
    /// Empty until the function is attached to a device
    full_id: String,
    session: SessionLink,
}

impl FunctionCore {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        FunctionCore {
            clean_name: naming::sanitize(&name),
            name,
            full_id: String::new(),
            session: SessionLink::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clean_name(&self) -> &str {
        &self.clean_name
    }

    pub fn is_attached(&self) -> bool {
        !self.full_id.is_empty()
    }

    /// `<device full id>_<clean name>`
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.full_id, self.clean_name)
    }

    /// `home/<device full id>/<clean name>/`
    pub fn base_topic(&self) -> String {
        naming::base_topic(&self.full_id, &self.clean_name)
    }

    /// Base topic followed by `suffix`, e.g. `topic("set")`.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}{}", self.base_topic(), suffix)
    }

    pub(crate) fn attach(&mut self, full_id: &str) {
        self.full_id = full_id.to_string();
    }

    pub(crate) fn bind(&mut self, session: SessionLink) {
        self.session = session;
    }

    /// Publishes `payload` on `<base topic><suffix>`.
    pub fn publish(&self, suffix: &str, payload: &Value) -> Result<()> {
        if !self.is_attached() {
            return Err(Error::Detached(self.name.clone()));
        }
        self.session.publish(&self.topic(suffix), payload)
    }

    /// Like [`publish`](Self::publish), but failures are only logged.
    pub fn publish_logged(&self, suffix: &str, payload: &Value) {
        if !self.is_attached() {
            error!("Function {} is not attached to a device", self.name);
            return;
        }
        self.session.publish_logged(&self.topic(suffix), payload);
    }
}

/// The contract every function variant fulfils.
pub trait Capability {
    fn core(&self) -> &FunctionCore;

    fn core_mut(&mut self) -> &mut FunctionCore;

    /// Discovery category, the `<component>` segment of the config topic.
    fn component(&self) -> Component;

    /// Command topics this function listens on. Empty for read-only functions.
    fn subscribe_topics(&self) -> Vec<String>;

    /// Static descriptor used for auto-registration. Stable across calls.
    fn discovery_payload(&self) -> Value;

    /// Decodes and validates a command and hands it to the control callback.
    /// Rejected messages leave the function's state untouched.
    fn handle_message(&mut self, topic: &str, payload: &[u8]) -> std::result::Result<(), DecodeError>;

    /// Republishes the last known state. Never changes it.
    fn publish_status(&self);

    fn name(&self) -> &str {
        self.core().name()
    }

    fn clean_name(&self) -> &str {
        self.core().clean_name()
    }

    fn unique_id(&self) -> String {
        self.core().unique_id()
    }

    fn discovery_topic(&self) -> String {
        naming::discovery_topic(self.component(), &self.core().full_id, self.clean_name())
    }
}

/// Closed set of function variants a device can carry.
#[derive(Debug)]
pub enum Function {
    OnOffLight(OnOffLight),
    DimmableLight(DimmableLight),
    Switch(Switch),
    Number(Number),
    Sensor(Sensor),
    Hvac(Hvac),
}

macro_rules! dispatch {
    ($self:expr, $f:ident => $body:expr) => {
        match $self {
            Function::OnOffLight($f) => $body,
            Function::DimmableLight($f) => $body,
            Function::Switch($f) => $body,
            Function::Number($f) => $body,
            Function::Sensor($f) => $body,
            Function::Hvac($f) => $body,
        }
    };
}

impl Capability for Function {
    fn core(&self) -> &FunctionCore {
        dispatch!(self, f => f.core())
    }

    fn core_mut(&mut self) -> &mut FunctionCore {
        dispatch!(self, f => f.core_mut())
    }

    fn component(&self) -> Component {
        dispatch!(self, f => f.component())
    }

    fn subscribe_topics(&self) -> Vec<String> {
        dispatch!(self, f => f.subscribe_topics())
    }

    fn discovery_payload(&self) -> Value {
        dispatch!(self, f => f.discovery_payload())
    }

    fn handle_message(&mut self, topic: &str, payload: &[u8]) -> std::result::Result<(), DecodeError> {
        dispatch!(self, f => f.handle_message(topic, payload))
    }

    fn publish_status(&self) {
        dispatch!(self, f => f.publish_status())
    }
}

macro_rules! variant_access {
    ($variant:ident, $ty:ty, $as_ref:ident, $as_mut:ident) => {
        impl From<$ty> for Function {
            fn from(function: $ty) -> Self {
                Function::$variant(function)
            }
        }

        impl Function {
            pub fn $as_ref(&self) -> Option<&$ty> {
                match self {
                    Function::$variant(f) => Some(f),
                    _ => None,
                }
            }

            pub fn $as_mut(&mut self) -> Option<&mut $ty> {
                match self {
                    Function::$variant(f) => Some(f),
                    _ => None,
                }
            }
        }
    };
}

variant_access!(OnOffLight, OnOffLight, as_on_off_light, as_on_off_light_mut);
variant_access!(DimmableLight, DimmableLight, as_dimmable_light, as_dimmable_light_mut);
variant_access!(Switch, Switch, as_switch, as_switch_mut);
variant_access!(Number, Number, as_number, as_number_mut);
variant_access!(Sensor, Sensor, as_sensor, as_sensor_mut);
variant_access!(Hvac, Hvac, as_hvac, as_hvac_mut);

/// Parses a command payload as a JSON document.
pub(crate) fn parse_json(payload: &[u8]) -> std::result::Result<Value, DecodeError> {
    serde_json::from_slice(payload).map_err(|e| DecodeError::Json(e.to_string()))
}

/// Parses a command payload as trimmed UTF-8 text.
pub(crate) fn parse_text(payload: &[u8]) -> std::result::Result<&str, DecodeError> {
    std::str::from_utf8(payload)
        .map(str::trim)
        .map_err(|_| DecodeError::NotUtf8)
}

/// Decodes an `"ON"`/`"OFF"` state string.
pub(crate) fn parse_on_off(value: &str) -> std::result::Result<bool, DecodeError> {
    match value {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        other => Err(DecodeError::InvalidValue {
            field: "state",
            value: other.to_string(),
        }),
    }
}

/// Reads the `state` field of a `{"state": "ON"}` document.
pub(crate) fn state_field(document: &Value) -> std::result::Result<bool, DecodeError> {
    let state = document
        .get("state")
        .ok_or(DecodeError::MissingField("state"))?;
    match state.as_str() {
        Some(text) => parse_on_off(text),
        None => Err(DecodeError::InvalidValue {
            field: "state",
            value: state.to_string(),
        }),
    }
}

/// Decodes an on/off command sent either as `{"state": "ON"}` or as bare `ON`.
pub(crate) fn decode_state(payload: &[u8]) -> std::result::Result<bool, DecodeError> {
    let text = parse_text(payload)?;
    if text.starts_with('{') {
        state_field(&parse_json(text.as_bytes())?)
    } else {
        parse_on_off(text)
    }
}

pub(crate) fn on_off(state: bool) -> &'static str {
    if state {
        "ON"
    } else {
        "OFF"
    }
}

/// Rejects commands that were not sent to `expected`.
pub(crate) fn expect_topic(topic: &str, expected: &str) -> std::result::Result<(), DecodeError> {
    if topic == expected {
        Ok(())
    } else {
        Err(DecodeError::UnknownTopic(topic.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_derives_ids_from_parent() {
        let mut core = FunctionCore::new("Kitchen Light");
        assert_eq!(core.clean_name(), "kitchen_light");
        assert!(!core.is_attached());
        core.attach("abc_lights");
        assert_eq!(core.unique_id(), "abc_lights_kitchen_light");
        assert_eq!(core.base_topic(), "home/abc_lights/kitchen_light/");
        assert_eq!(core.topic("set"), "home/abc_lights/kitchen_light/set");
    }

    #[test]
    fn detached_publish_is_an_error() {
        let core = FunctionCore::new("x");
        assert!(matches!(
            core.publish("state", &serde_json::json!({})),
            Err(Error::Detached(_))
        ));
    }

    #[test]
    fn on_off_parsing_is_strict() {
        assert_eq!(parse_on_off("ON"), Ok(true));
        assert_eq!(parse_on_off("OFF"), Ok(false));
        assert!(parse_on_off("on").is_err());
        assert!(parse_on_off("1").is_err());
        assert_eq!(
            state_field(&serde_json::json!({"brightness": 3})),
            Err(DecodeError::MissingField("state"))
        );
        assert!(state_field(&serde_json::json!({"state": true})).is_err());
    }

    #[test]
    fn state_commands_accept_json_and_bare_text() {
        assert_eq!(decode_state(br#"{"state":"ON"}"#), Ok(true));
        assert_eq!(decode_state(b"OFF"), Ok(false));
        assert_eq!(decode_state(b" ON \n"), Ok(true));
        assert!(matches!(decode_state(b"{not json"), Err(DecodeError::Json(_))));
        assert_eq!(decode_state(&[0xff, 0xfe]), Err(DecodeError::NotUtf8));
    }
}
