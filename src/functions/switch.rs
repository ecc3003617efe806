use serde_json::{json, Value};
use tracing::debug;

use crate::core::error::DecodeError;
use crate::core::function::{decode_state, expect_topic, on_off, Capability, FunctionCore};
use crate::core::naming::Component;

/// A plain on/off switch, e.g. a relay or a pump.
pub struct Switch {
    core: FunctionCore,
    state: bool,
    control: Box<dyn FnMut(bool)>,
}

impl std::fmt::Debug for Switch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switch")
            .field("core", &self.core)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Switch {
    pub fn new(name: impl Into<String>, control: impl FnMut(bool) + 'static) -> Self {
        Switch {
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

impl Capability for Switch {
    fn core(&self) -> &FunctionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FunctionCore {
        &mut self.core
    }

    fn component(&self) -> Component {
        Component::Switch
    }

    fn subscribe_topics(&self) -> Vec<String> {
        vec![self.core.topic("set")]
    }

    fn discovery_payload(&self) -> Value {
        json!({
            "name": self.core.name(),
            "unique_id": self.core.unique_id(),
            "state_topic": self.core.topic("state"),
            "value_template": "{{ value_json.state }}",
            "command_topic": self.core.topic("set"),
            "payload_on": "ON",
            "payload_off": "OFF",
        })
    }

    fn handle_message(&mut self, topic: &str, payload: &[u8]) -> Result<(), DecodeError> {
        debug!("Processing message for switch {} on {}", self.core.name(), topic);
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
    use std::cell::Cell;
    use std::rc::Rc;

    fn attached(control: impl FnMut(bool) + 'static) -> Switch {
        let mut switch = Switch::new("Pump", control);
        switch.core_mut().attach("abc_pump");
        switch
    }

    #[test]
    fn accepts_json_and_bare_payloads() {
        let last = Rc::new(Cell::new(None));
        let sink = last.clone();
        let mut switch = attached(move |s| sink.set(Some(s)));

        switch
            .handle_message("home/abc_pump/pump/set", br#"{"state":"ON"}"#)
            .unwrap();
        assert_eq!(last.get(), Some(true));
        switch
            .handle_message("home/abc_pump/pump/set", b"OFF")
            .unwrap();
        assert_eq!(last.get(), Some(false));
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let calls = Rc::new(Cell::new(0));
        let sink = calls.clone();
        let mut switch = attached(move |_| sink.set(sink.get() + 1));

        let err = switch
            .handle_message("home/abc_pump/pump/set", b"maybe")
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { .. }));
        assert!(switch
            .handle_message("home/abc_pump/pump/set", b"{\"state\":")
            .is_err());
        assert_eq!(calls.get(), 0);
        assert!(!switch.state());
    }

    #[test]
    fn discovery_topic_uses_clean_name() {
        let switch = attached(|_| {});
        assert_eq!(
            switch.discovery_topic(),
            "homeassistant/switch/abc_pump/pump/config"
        );
        assert_eq!(switch.subscribe_topics(), vec!["home/abc_pump/pump/set"]);
        assert_eq!(switch.discovery_payload(), switch.discovery_payload());
    }
}
