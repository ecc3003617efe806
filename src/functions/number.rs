use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::core::error::{DecodeError, Error, Result};
use crate::core::function::{expect_topic, parse_text, Capability, FunctionCore};
use crate::core::naming::Component;

const GRID_EPSILON: f64 = 1e-9;

/// A bounded numeric control, shown as a slider or box in Home Assistant.
///
/// Commands arrive as bare numeric strings. They are clamped to `[min, max]`
/// and snapped to the step grid anchored at `min` before the callback sees
/// them; values equal to the current one are ignored.
pub struct Number {
    core: FunctionCore,
    value: f64,
    max: f64,
    min: f64,
    step: f64,
    control: Box<dyn FnMut(f64)>,
}

impl std::fmt::Debug for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Number")
            .field("core", &self.core)
            .field("value", &self.value)
            .field("max", &self.max)
            .field("min", &self.min)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl Number {
    pub const DEFAULT_MAX: f64 = 100.0;
    pub const DEFAULT_MIN: f64 = 0.0;
    pub const DEFAULT_STEP: f64 = 1.0;

    /// Number in `[0, 100]` with a step of 1.
    pub fn new(name: impl Into<String>, control: impl FnMut(f64) + 'static) -> Result<Self> {
        Self::with_bounds(
            name,
            control,
            Self::DEFAULT_MAX,
            Self::DEFAULT_MIN,
            Self::DEFAULT_STEP,
        )
    }

    /// # Errors
    ///
    /// [`Error::ZeroStep`] if `step` is zero, negative or not finite, and
    /// [`Error::InvalidBounds`] if `min > max` or either bound is not finite.
    pub fn with_bounds(
        name: impl Into<String>,
        control: impl FnMut(f64) + 'static,
        max: f64,
        min: f64,
        step: f64,
    ) -> Result<Self> {
        let core = FunctionCore::new(name);
        if step == 0.0 || !step.is_finite() || step < 0.0 {
            error!("Step size of number {} is {}, refusing to build it", core.name(), step);
            return Err(Error::ZeroStep {
                name: core.name().to_string(),
            });
        }
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(Error::InvalidBounds {
                name: core.name().to_string(),
                min,
                max,
            });
        }
        Ok(Number {
            core,
            value: min,
            max,
            min,
            step,
            control: Box::new(control),
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Clamps `value` into `[min, max]` and snaps it to `min + k * step`.
    pub fn clamp_quantize(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        // Highest grid index inside the range, tolerant of `0.3 / 0.1 == 2.9999...`.
        let max_steps = ((self.max - self.min) / self.step + GRID_EPSILON).floor();
        let steps = ((clamped - self.min) / self.step).round().min(max_steps);
        (self.min + steps * self.step).min(self.max)
    }

    /// Stores `value` (clamped and snapped) and publishes it.
    pub fn update(&mut self, value: f64) {
        let snapped = self.clamp_quantize(value);
        if snapped != value {
            debug!("Number {} adjusted {} to {}", self.core.name(), value, snapped);
        }
        self.value = snapped;
        self.publish_status();
    }
}

impl Capability for Number {
    fn core(&self) -> &FunctionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FunctionCore {
        &mut self.core
    }

    fn component(&self) -> Component {
        Component::Number
    }

    fn subscribe_topics(&self) -> Vec<String> {
        vec![self.core.topic("set")]
    }

    fn discovery_payload(&self) -> Value {
        json!({
            "name": self.core.name(),
            "unique_id": self.core.unique_id(),
            "state_topic": self.core.topic("state"),
            "value_template": "{{ value_json.value }}",
            "command_topic": self.core.topic("set"),
            "min": self.min,
            "max": self.max,
            "step": self.step,
        })
    }

    fn handle_message(&mut self, topic: &str, payload: &[u8]) -> std::result::Result<(), DecodeError> {
        debug!("Processing message for number {} on {}", self.core.name(), topic);
        expect_topic(topic, &self.core.topic("set"))?;

        let text = parse_text(payload)?;
        let value: f64 = text
            .parse()
            .map_err(|_| DecodeError::NotANumber(text.to_string()))?;
        if value.is_nan() {
            return Err(DecodeError::NotANumber(text.to_string()));
        }
        if value > self.max {
            info!("Value {} is larger than max value {}, using max", value, self.max);
        } else if value < self.min {
            info!("Value {} is smaller than min value {}, using min", value, self.min);
        }

        let value = self.clamp_quantize(value);
        if value != self.value {
            (self.control)(value);
        } else {
            debug!("Number {} already at {}", self.core.name(), value);
        }
        Ok(())
    }

    fn publish_status(&self) {
        self.core
            .publish_logged("state", &json!({ "value": self.value }));
    }
}
