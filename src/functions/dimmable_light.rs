use serde_json::{json, Value};
use tracing::debug;

use crate::core::error::DecodeError;
use crate::core::function::{
    expect_topic, on_off, parse_json, state_field, Capability, FunctionCore,
};
use crate::core::naming::Component;

/// Brightness scale used on the wire.
const BRIGHTNESS_SCALE: f64 = 255.0;

/// A light with on/off state and brightness.
///
/// Brightness is kept as a fraction in `0.0..=1.0` and scaled to `0..=255` on
/// the wire. The control callback receives `(state, fraction)`.
pub struct DimmableLight {
    core: FunctionCore,
    state: bool,
    brightness: f64,
    control: Box<dyn FnMut(bool, f64)>,
}

impl std::fmt::Debug for DimmableLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimmableLight")
            .field("core", &self.core)
            .field("state", &self.state)
            .field("brightness", &self.brightness)
            .finish_non_exhaustive()
    }
}

impl DimmableLight {
    pub fn new(name: impl Into<String>, control: impl FnMut(bool, f64) + 'static) -> Self {
        DimmableLight {
            core: FunctionCore::new(name),
            state: false,
            brightness: 0.0,
            control: Box::new(control),
        }
    }

    pub fn state(&self) -> bool {
        self.state
    }

    /// Brightness as a fraction in `0.0..=1.0`.
    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    pub fn update(&mut self, state: bool, brightness: f64) {
        self.state = state;
        self.brightness = brightness.clamp(0.0, 1.0);
        self.publish_status();
    }

    fn wire_brightness(&self) -> u8 {
        (self.brightness * BRIGHTNESS_SCALE).round() as u8
    }
}

impl Capability for DimmableLight {
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
            "brightness": true,
            "brightness_scale": BRIGHTNESS_SCALE as u32,
        })
    }

    fn handle_message(&mut self, topic: &str, payload: &[u8]) -> Result<(), DecodeError> {
        debug!("Processing message for dimmable light {} on {}", self.core.name(), topic);
        expect_topic(topic, &self.core.topic("set"))?;

        let document = parse_json(payload)?;
        let state = state_field(&document)?;
        // A bare on/off toggle keeps the current brightness.
        let brightness = match document.get("brightness") {
            None => self.brightness,
            Some(raw) => {
                let level = raw.as_f64().ok_or_else(|| DecodeError::InvalidValue {
                    field: "brightness",
                    value: raw.to_string(),
                })?;
                if !(0.0..=BRIGHTNESS_SCALE).contains(&level) {
                    return Err(DecodeError::InvalidValue {
                        field: "brightness",
                        value: raw.to_string(),
                    });
                }
                level / BRIGHTNESS_SCALE
            }
        };

        (self.control)(state, brightness);
        Ok(())
    }

    fn publish_status(&self) {
        debug!(
            "Sending status for dimmable light {} with state {} and brightness {}",
            self.core.name(),
            self.state,
            self.wire_brightness()
        );
        self.core.publish_logged(
            "state",
            &json!({
                "state": on_off(self.state),
                "brightness": self.wire_brightness(),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn attached(control: impl FnMut(bool, f64) + 'static) -> DimmableLight {
        let mut light = DimmableLight::new("Desk Lamp", control);
        light.core_mut().attach("abc_office");
        light
    }

    #[test]
    fn brightness_is_scaled_to_a_fraction() {
        let seen = Rc::new(Cell::new((false, -1.0)));
        let sink = seen.clone();
        let mut light = attached(move |s, b| sink.set((s, b)));

        light
            .handle_message(
                "home/abc_office/desk_lamp/set",
                br#"{"state":"ON","brightness":255}"#,
            )
            .unwrap();
        assert_eq!(seen.get(), (true, 1.0));

        light
            .handle_message(
                "home/abc_office/desk_lamp/set",
                br#"{"state":"ON","brightness":51}"#,
            )
            .unwrap();
        assert!((seen.get().1 - 0.2).abs() < 1e-9);
    }

    #[test]
    fn missing_brightness_keeps_current_level() {
        let seen = Rc::new(Cell::new((false, -1.0)));
        let sink = seen.clone();
        let mut light = attached(move |s, b| sink.set((s, b)));
        light.update(true, 0.5);

        light
            .handle_message("home/abc_office/desk_lamp/set", br#"{"state":"OFF"}"#)
            .unwrap();
        assert_eq!(seen.get(), (false, 0.5));
    }

    #[test]
    fn out_of_range_brightness_is_rejected() {
        let mut light = attached(|_, _| panic!("must not be called"));
        assert!(light
            .handle_message(
                "home/abc_office/desk_lamp/set",
                br#"{"state":"ON","brightness":300}"#,
            )
            .is_err());
        assert!(light
            .handle_message(
                "home/abc_office/desk_lamp/set",
                br#"{"state":"ON","brightness":"bright"}"#,
            )
            .is_err());
    }

    #[test]
    fn wire_brightness_rounds_to_nearest() {
        let mut light = attached(|_, _| {});
        light.update(true, 0.5);
        assert_eq!(light.wire_brightness(), 128);
        light.update(true, 0.001);
        assert_eq!(light.wire_brightness(), 0);
        light.update(true, 7.0);
        assert_eq!(light.brightness(), 1.0);
        assert_eq!(light.wire_brightness(), 255);
    }
}
