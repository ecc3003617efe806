use serde_json::{json, Value};
use tracing::debug;

use crate::core::error::DecodeError;
use crate::core::function::{decode_state, expect_topic, on_off, Capability, FunctionCore};
use crate::core::naming::Component;

/// A light that can only be switched on and off.
pub struct OnOffLight {
    core: FunctionCore,
    state: bool,
    control: Box<dyn FnMut(bool)>,
}

impl std::fmt::Debug for OnOffLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnOffLight")
            .field("core", &self.core)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl OnOffLight {
    pub fn new(name: impl Into<String>, control: impl FnMut(bool) + 'static) -> Self {
        OnOffLight {
            core: FunctionCore::new(name),
            state: false,
            control: Box::new(control),
        }
    }

    pub fn state(&self) -> bool {
        self.state
    }

    pub fn update(&mut self, state: bool) {
        self.state = state;
        self.publish_status();
    }
}

impl Capability for OnOffLight {
    fn core(&self) -> &FunctionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FunctionCore {
        &mut self.core
    }

    fn component(&self) -> Component {
        Component::Light
    }

    fn subscribe_topics(&self) -> Vec<String> {
        vec![self.core.topic("set")]
    }

    fn discovery_payload(&self) -> Value {
        json!({
            "name": self.core.name(),
            "unique_id": self.core.unique_id(),
            "schema": "json",
            "state_topic": self.core.topic("state"),
            "command_topic": self.core.topic("set"),
        })
    }

    fn handle_message(&mut self, topic: &str, payload: &[u8]) -> Result<(), DecodeError> {
        debug!("Processing message for on/off light {} on {}", self.core.name(), topic);
        expect_topic(topic, &self.core.topic("set"))?;
        let state = decode_state(payload)?;
        (self.control)(state);
        Ok(())
    }

    fn publish_status(&self) {
        self.core
            .publish_logged("state", &json!({ "state": on_off(self.state) }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn command_reaches_callback() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut light = OnOffLight::new("Porch", move |s| sink.borrow_mut().push(s));
        light.core_mut().attach("abc_lights");

        light
            .handle_message("home/abc_lights/porch/set", br#"{"state":"ON"}"#)
            .unwrap();
        light
            .handle_message("home/abc_lights/porch/set", br#"{"state":"OFF"}"#)
            .unwrap();
        assert_eq!(*seen.borrow(), vec![true, false]);
        assert!(!light.state());
    }

    #[test]
    fn rejects_foreign_topics_and_bad_states() {
        let mut light = OnOffLight::new("Porch", |_| panic!("must not be called"));
        light.core_mut().attach("abc_lights");
        assert!(light
            .handle_message("home/abc_lights/porch/state", br#"{"state":"ON"}"#)
            .is_err());
        assert!(light
            .handle_message("home/abc_lights/porch/set", br#"{"state":"DIM"}"#)
            .is_err());
    }

    #[test]
    fn discovery_uses_json_schema() {
        let mut light = OnOffLight::new("Porch", |_| {});
        light.core_mut().attach("abc_lights");
        let doc = light.discovery_payload();
        assert_eq!(doc["schema"], "json");
        assert_eq!(doc["unique_id"], "abc_lights_porch");
        assert_eq!(doc["command_topic"], "home/abc_lights/porch/set");
        assert_eq!(
            light.discovery_topic(),
            "homeassistant/light/abc_lights/porch/config"
        );
    }
}
