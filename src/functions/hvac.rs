//! Climate control unit with an opt-in feature set.
//!
//! Every sub-feature of an HVAC unit has its own topic pair below the
//! function's base topic. Features that are not enabled are never subscribed
//! to, never announced and never published.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use crate::core::error::DecodeError;
use crate::core::function::{parse_json, Capability, FunctionCore};
use crate::core::naming::Component;

/// One independently switchable HVAC capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HvacFeature {
    /// Current temperature report
    Temperature,
    HeatingSetpoint,
    CoolingSetpoint,
    /// Current humidity report
    Humidity,
    HumiditySetpoint,
    FanMode,
    SwingMode,
    /// On/off control
    Power,
    /// Operating mode selection, e.g. heat, cool, dry
    Mode,
    /// Report of what the unit is doing right now
    Action,
    Preset,
}

impl HvacFeature {
    /// Order in which [`Hvac::publish_status`] walks the features.
    pub const ALL: [HvacFeature; 11] = [
        HvacFeature::Temperature,
        HvacFeature::HeatingSetpoint,
        HvacFeature::CoolingSetpoint,
        HvacFeature::Humidity,
        HvacFeature::HumiditySetpoint,
        HvacFeature::FanMode,
        HvacFeature::SwingMode,
        HvacFeature::Power,
        HvacFeature::Mode,
        HvacFeature::Action,
        HvacFeature::Preset,
    ];

    pub const fn bit(self) -> u32 {
        match self {
            HvacFeature::Temperature => 0x0001,
            HvacFeature::HeatingSetpoint => 0x0002,
            HvacFeature::CoolingSetpoint => 0x0004,
            HvacFeature::Humidity => 0x0010,
            HvacFeature::HumiditySetpoint => 0x0020,
            HvacFeature::FanMode => 0x0100,
            HvacFeature::SwingMode => 0x0200,
            HvacFeature::Power => 0x1000,
            HvacFeature::Mode => 0x2000,
            HvacFeature::Action => 0x4000,
            HvacFeature::Preset => 0x8000,
        }
    }

    /// Sub-topic the hub sends commands to, `None` for report-only features.
    pub fn command_suffix(self) -> Option<&'static str> {
        match self {
            HvacFeature::HeatingSetpoint => Some("heating_temperature/set"),
            HvacFeature::CoolingSetpoint => Some("cooling_temperature/set"),
            HvacFeature::HumiditySetpoint => Some("humidity/set"),
            HvacFeature::FanMode => Some("fan_mode/set"),
            HvacFeature::SwingMode => Some("swing_mode/set"),
            HvacFeature::Power => Some("set"),
            HvacFeature::Mode => Some("mode/set"),
            HvacFeature::Preset => Some("preset_mode/set"),
            HvacFeature::Temperature | HvacFeature::Humidity | HvacFeature::Action => None,
        }
    }

    /// Sub-topic the feature's state is published on. Power has none, it is
    /// reflected by the operating mode.
    pub fn state_suffix(self) -> Option<&'static str> {
        match self {
            HvacFeature::Temperature => Some("temperature/measured"),
            HvacFeature::HeatingSetpoint => Some("heating_temperature/state"),
            HvacFeature::CoolingSetpoint => Some("cooling_temperature/state"),
            HvacFeature::Humidity => Some("humidity/measured"),
            HvacFeature::HumiditySetpoint => Some("humidity/state"),
            HvacFeature::FanMode => Some("fan_mode/state"),
            HvacFeature::SwingMode => Some("swing_mode/state"),
            HvacFeature::Mode => Some("mode/state"),
            HvacFeature::Action => Some("action/state"),
            HvacFeature::Preset => Some("preset_mode/state"),
            HvacFeature::Power => None,
        }
    }
}

impl fmt::Display for HvacFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HvacFeature::Temperature => "temperature",
            HvacFeature::HeatingSetpoint => "heating setpoint",
            HvacFeature::CoolingSetpoint => "cooling setpoint",
            HvacFeature::Humidity => "humidity",
            HvacFeature::HumiditySetpoint => "humidity setpoint",
            HvacFeature::FanMode => "fan mode",
            HvacFeature::SwingMode => "swing mode",
            HvacFeature::Power => "power",
            HvacFeature::Mode => "mode",
            HvacFeature::Action => "action",
            HvacFeature::Preset => "preset",
        };
        f.write_str(name)
    }
}

/// Bitmask of enabled [`HvacFeature`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HvacFeatures(u32);

impl HvacFeatures {
    pub const TEMPERATURE: Self = Self(HvacFeature::Temperature.bit());
    pub const TEMPERATURE_CONTROL_HEATING: Self = Self(HvacFeature::HeatingSetpoint.bit());
    pub const TEMPERATURE_CONTROL_COOLING: Self = Self(HvacFeature::CoolingSetpoint.bit());
    pub const HUMIDITY: Self = Self(HvacFeature::Humidity.bit());
    pub const HUMIDITY_CONTROL: Self = Self(HvacFeature::HumiditySetpoint.bit());
    pub const FAN_MODE: Self = Self(HvacFeature::FanMode.bit());
    pub const SWING_MODE: Self = Self(HvacFeature::SwingMode.bit());
    pub const POWER_CONTROL: Self = Self(HvacFeature::Power.bit());
    pub const MODE_CONTROL: Self = Self(HvacFeature::Mode.bit());
    pub const ACTION: Self = Self(HvacFeature::Action.bit());
    pub const PRESET_SUPPORT: Self = Self(HvacFeature::Preset.bit());

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        HvacFeature::ALL.into_iter().map(Self::from).fold(Self::empty(), BitOr::bitor)
    }

    /// Unknown bits are kept but never acted upon.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, feature: HvacFeature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = HvacFeature> {
        HvacFeature::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl From<HvacFeature> for HvacFeatures {
    fn from(feature: HvacFeature) -> Self {
        Self(feature.bit())
    }
}

impl BitOr for HvacFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacAction {
    #[default]
    Off,
    Heating,
    Cooling,
    Drying,
    Idle,
    Fan,
}

impl HvacAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HvacAction::Off => "off",
            HvacAction::Heating => "heating",
            HvacAction::Cooling => "cooling",
            HvacAction::Drying => "drying",
            HvacAction::Idle => "idle",
            HvacAction::Fan => "fan",
        }
    }
}

impl fmt::Display for HvacAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change reported by the application.
#[derive(Debug, Clone, PartialEq)]
pub enum HvacUpdate {
    Temperature(f64),
    HeatingSetpoint(f64),
    CoolingSetpoint(f64),
    Humidity(f64),
    HumiditySetpoint(f64),
    FanMode(String),
    SwingMode(String),
    Power(bool),
    Mode(String),
    Action(HvacAction),
    Preset(String),
}

impl HvacUpdate {
    /// Feature that must be enabled for the update to be accepted.
    pub fn feature(&self) -> HvacFeature {
        match self {
            HvacUpdate::Temperature(_) => HvacFeature::Temperature,
            HvacUpdate::HeatingSetpoint(_) => HvacFeature::HeatingSetpoint,
            HvacUpdate::CoolingSetpoint(_) => HvacFeature::CoolingSetpoint,
            HvacUpdate::Humidity(_) => HvacFeature::Humidity,
            HvacUpdate::HumiditySetpoint(_) => HvacFeature::HumiditySetpoint,
            HvacUpdate::FanMode(_) => HvacFeature::FanMode,
            HvacUpdate::SwingMode(_) => HvacFeature::SwingMode,
            HvacUpdate::Power(_) => HvacFeature::Power,
            HvacUpdate::Mode(_) => HvacFeature::Mode,
            HvacUpdate::Action(_) => HvacFeature::Action,
            HvacUpdate::Preset(_) => HvacFeature::Preset,
        }
    }
}

const MODE_OFF: &str = "off";
const COMMAND_TEMPLATE: &str = r#"{"value": "{{ value }}" }"#;
const VALUE_TEMPLATE: &str = "{{ value_json.value }}";

/// Composite climate function.
///
/// The control callback receives the feature a command was addressed to and
/// the requested value as text. The unit's state only changes through
/// [`apply`](Self::apply) or the `update_*` shorthands.
pub struct Hvac {
    core: FunctionCore,
    features: HvacFeatures,
    control: Box<dyn FnMut(HvacFeature, String)>,
    modes: Vec<String>,
    fan_modes: Vec<String>,
    swing_modes: Vec<String>,
    preset_modes: Vec<String>,
    power: bool,
    temperature: f64,
    heating_setpoint: f64,
    cooling_setpoint: f64,
    humidity: f64,
    humidity_setpoint: f64,
    fan_mode: String,
    swing_mode: String,
    mode: String,
    last_mode: String,
    action: HvacAction,
    preset_mode: String,
}

impl fmt::Debug for Hvac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hvac")
            .field("core", &self.core)
            .field("features", &self.features)
            .field("power", &self.power)
            .field("mode", &self.mode)
            .field("last_mode", &self.last_mode)
            .field("temperature", &self.temperature)
            .field("heating_setpoint", &self.heating_setpoint)
            .field("cooling_setpoint", &self.cooling_setpoint)
            .field("humidity", &self.humidity)
            .field("humidity_setpoint", &self.humidity_setpoint)
            .field("fan_mode", &self.fan_mode)
            .field("swing_mode", &self.swing_mode)
            .field("action", &self.action)
            .field("preset_mode", &self.preset_mode)
            .finish_non_exhaustive()
    }
}

fn owned(items: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    items.into_iter().map(Into::into).collect()
}

impl Hvac {
    pub fn new(
        name: impl Into<String>,
        control: impl FnMut(HvacFeature, String) + 'static,
        features: HvacFeatures,
    ) -> Self {
        Hvac {
            core: FunctionCore::new(name),
            features,
            control: Box::new(control),
            modes: Vec::new(),
            fan_modes: Vec::new(),
            swing_modes: Vec::new(),
            preset_modes: Vec::new(),
            power: false,
            temperature: 0.0,
            heating_setpoint: 18.0,
            cooling_setpoint: 25.0,
            humidity: 0.0,
            humidity_setpoint: 60.0,
            fan_mode: "auto".to_string(),
            swing_mode: "off".to_string(),
            mode: MODE_OFF.to_string(),
            last_mode: MODE_OFF.to_string(),
            action: HvacAction::Off,
            preset_mode: "none".to_string(),
        }
    }

    /// Operating modes offered to the hub. The first mode other than `off`
    /// is what powering on selects until the unit has been switched off once.
    pub fn with_modes(mut self, modes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.modes = owned(modes);
        self.last_mode = self
            .modes
            .iter()
            .find(|m| m.as_str() != MODE_OFF)
            .cloned()
            .unwrap_or_else(|| MODE_OFF.to_string());
        self
    }

    pub fn with_fan_modes(mut self, modes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fan_modes = owned(modes);
        self
    }

    pub fn with_swing_modes(mut self, modes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.swing_modes = owned(modes);
        self
    }

    pub fn with_preset_modes(mut self, modes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.preset_modes = owned(modes);
        self
    }

    pub fn features(&self) -> HvacFeatures {
        self.features
    }

    pub fn modes(&self) -> &[String] {
        &self.modes
    }

    pub fn fan_modes(&self) -> &[String] {
        &self.fan_modes
    }

    pub fn swing_modes(&self) -> &[String] {
        &self.swing_modes
    }

    pub fn preset_modes(&self) -> &[String] {
        &self.preset_modes
    }

    pub fn power(&self) -> bool {
        self.power
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn heating_setpoint(&self) -> f64 {
        self.heating_setpoint
    }

    pub fn cooling_setpoint(&self) -> f64 {
        self.cooling_setpoint
    }

    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    pub fn humidity_setpoint(&self) -> f64 {
        self.humidity_setpoint
    }

    pub fn fan_mode(&self) -> &str {
        &self.fan_mode
    }

    pub fn swing_mode(&self) -> &str {
        &self.swing_mode
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Mode restored by the next power on.
    pub fn last_mode(&self) -> &str {
        &self.last_mode
    }

    pub fn action(&self) -> HvacAction {
        self.action
    }

    pub fn preset_mode(&self) -> &str {
        &self.preset_mode
    }

    /// Applies a state change and, if `send_status` is set, publishes the
    /// affected feature. Returns `false` if the feature is not enabled, in
    /// which case nothing changes.
    pub fn apply(&mut self, update: HvacUpdate, send_status: bool) -> bool {
        let feature = update.feature();
        if !self.features.contains(feature) {
            error!(
                "Feature {} is not supported by hvac function {}",
                feature,
                self.core.name()
            );
            return false;
        }

        let mut published = feature;
        match update {
            HvacUpdate::Temperature(v) => self.temperature = v,
            HvacUpdate::HeatingSetpoint(v) => self.heating_setpoint = v,
            HvacUpdate::CoolingSetpoint(v) => self.cooling_setpoint = v,
            HvacUpdate::Humidity(v) => self.humidity = v,
            HvacUpdate::HumiditySetpoint(v) => self.humidity_setpoint = v,
            HvacUpdate::FanMode(m) => self.fan_mode = m,
            HvacUpdate::SwingMode(m) => self.swing_mode = m,
            HvacUpdate::Power(on) => {
                if on {
                    self.mode = self.last_mode.clone();
                } else {
                    self.last_mode = std::mem::replace(&mut self.mode, MODE_OFF.to_string());
                }
                self.power = on;
                published = HvacFeature::Mode;
            }
            HvacUpdate::Mode(m) => {
                self.power = m != MODE_OFF;
                self.mode = m;
            }
            HvacUpdate::Action(a) => self.action = a,
            HvacUpdate::Preset(p) => self.preset_mode = p,
        }

        if send_status {
            self.publish_feature_status(published);
        }
        true
    }

    pub fn update_temperature(&mut self, temperature: f64) -> bool {
        self.apply(HvacUpdate::Temperature(temperature), true)
    }

    pub fn update_heating_setpoint(&mut self, setpoint: f64) -> bool {
        self.apply(HvacUpdate::HeatingSetpoint(setpoint), true)
    }

    pub fn update_cooling_setpoint(&mut self, setpoint: f64) -> bool {
        self.apply(HvacUpdate::CoolingSetpoint(setpoint), true)
    }

    pub fn update_humidity(&mut self, humidity: f64) -> bool {
        self.apply(HvacUpdate::Humidity(humidity), true)
    }

    pub fn update_humidity_setpoint(&mut self, setpoint: f64) -> bool {
        self.apply(HvacUpdate::HumiditySetpoint(setpoint), true)
    }

    pub fn update_fan_mode(&mut self, mode: impl Into<String>) -> bool {
        self.apply(HvacUpdate::FanMode(mode.into()), true)
    }

    pub fn update_swing_mode(&mut self, mode: impl Into<String>) -> bool {
        self.apply(HvacUpdate::SwingMode(mode.into()), true)
    }

    /// Switching off remembers the current mode, switching on restores it.
    pub fn update_power_state(&mut self, power: bool) -> bool {
        self.apply(HvacUpdate::Power(power), true)
    }

    pub fn update_device_mode(&mut self, mode: impl Into<String>) -> bool {
        self.apply(HvacUpdate::Mode(mode.into()), true)
    }

    pub fn update_action(&mut self, action: HvacAction) -> bool {
        self.apply(HvacUpdate::Action(action), true)
    }

    pub fn update_preset_mode(&mut self, preset: impl Into<String>) -> bool {
        self.apply(HvacUpdate::Preset(preset.into()), true)
    }

    /// Publishes the state sub-topic of one feature, if it is enabled.
    pub fn publish_feature_status(&self, feature: HvacFeature) {
        if !self.features.contains(feature) {
            debug!(
                "Feature {} is not enabled on hvac function {}",
                feature,
                self.core.name()
            );
            return;
        }
        let Some(suffix) = feature.state_suffix() else {
            return;
        };
        let payload = match feature {
            HvacFeature::Temperature => json!({ "temperature": self.temperature }),
            HvacFeature::Humidity => json!({ "humidity": self.humidity }),
            HvacFeature::Action => json!({ "action": self.action }),
            HvacFeature::HeatingSetpoint => json!({ "value": self.heating_setpoint }),
            HvacFeature::CoolingSetpoint => json!({ "value": self.cooling_setpoint }),
            HvacFeature::HumiditySetpoint => json!({ "value": self.humidity_setpoint }),
            HvacFeature::FanMode => json!({ "value": self.fan_mode }),
            HvacFeature::SwingMode => json!({ "value": self.swing_mode }),
            HvacFeature::Mode => json!({ "value": self.mode }),
            HvacFeature::Preset => json!({ "value": self.preset_mode }),
            HvacFeature::Power => return,
        };
        self.core.publish_logged(suffix, &payload);
    }

    fn command_feature(&self, topic: &str) -> Result<HvacFeature, DecodeError> {
        let suffix = topic
            .strip_prefix(self.core.base_topic().as_str())
            .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;
        let feature = HvacFeature::ALL
            .into_iter()
            .find(|f| f.command_suffix() == Some(suffix))
            .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;
        if !self.features.contains(feature) {
            return Err(DecodeError::FeatureDisabled(feature.to_string()));
        }
        Ok(feature)
    }

    fn validate(&self, feature: HvacFeature, value: &str) -> Result<(), DecodeError> {
        let (field, modes) = match feature {
            HvacFeature::HeatingSetpoint
            | HvacFeature::CoolingSetpoint
            | HvacFeature::HumiditySetpoint => {
                return match value.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(()),
                    _ => Err(DecodeError::NotANumber(value.to_string())),
                }
            }
            HvacFeature::Power if value == "on" || value == "off" => return Ok(()),
            HvacFeature::Power => {
                return Err(DecodeError::InvalidValue {
                    field: "power",
                    value: value.to_string(),
                })
            }
            HvacFeature::FanMode => ("fan_mode", &self.fan_modes),
            HvacFeature::SwingMode => ("swing_mode", &self.swing_modes),
            HvacFeature::Mode => ("mode", &self.modes),
            HvacFeature::Preset => ("preset_mode", &self.preset_modes),
            HvacFeature::Temperature | HvacFeature::Humidity | HvacFeature::Action => return Ok(()),
        };
        // An empty list leaves the choice unrestricted.
        if modes.is_empty() || modes.iter().any(|m| m == value) {
            Ok(())
        } else {
            Err(DecodeError::InvalidValue {
                field,
                value: value.to_string(),
            })
        }
    }

    fn command_fields(&self, feature: HvacFeature, fields: &mut Map<String, Value>) {
        let (Some(command), Some(state)) = (feature.command_suffix(), feature.state_suffix()) else {
            return;
        };
        let prefix = match feature {
            HvacFeature::HeatingSetpoint => "temperature_low",
            HvacFeature::CoolingSetpoint => "temperature_high",
            HvacFeature::HumiditySetpoint => "target_humidity",
            HvacFeature::FanMode => "fan_mode",
            HvacFeature::SwingMode => "swing_mode",
            HvacFeature::Mode => "mode",
            HvacFeature::Preset => "preset_mode",
            _ => return,
        };
        let state_template_key = if feature == HvacFeature::Preset {
            "preset_mode_value_template".to_string()
        } else {
            format!("{prefix}_state_template")
        };
        fields.insert(format!("{prefix}_command_topic"), self.core.topic(command).into());
        fields.insert(format!("{prefix}_command_template"), COMMAND_TEMPLATE.into());
        fields.insert(format!("{prefix}_state_topic"), self.core.topic(state).into());
        fields.insert(state_template_key, VALUE_TEMPLATE.into());
    }
}

impl Capability for Hvac {
    fn core(&self) -> &FunctionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FunctionCore {
        &mut self.core
    }

    fn component(&self) -> Component {
        Component::Climate
    }

    fn subscribe_topics(&self) -> Vec<String> {
        self.features
            .iter()
            .filter_map(HvacFeature::command_suffix)
            .map(|suffix| self.core.topic(suffix))
            .collect()
    }

    fn discovery_payload(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("name".into(), self.core.name().into());
        fields.insert("unique_id".into(), self.core.unique_id().into());

        for feature in self.features.iter() {
            match feature {
                HvacFeature::Temperature => {
                    fields.insert(
                        "current_temperature_topic".into(),
                        self.core.topic("temperature/measured").into(),
                    );
                    fields.insert(
                        "current_temperature_template".into(),
                        "{{ value_json.temperature }}".into(),
                    );
                }
                HvacFeature::Humidity => {
                    fields.insert(
                        "current_humidity_topic".into(),
                        self.core.topic("humidity/measured").into(),
                    );
                    fields.insert(
                        "current_humidity_template".into(),
                        "{{ value_json.humidity }}".into(),
                    );
                }
                HvacFeature::Power => {
                    fields.insert("power_command_topic".into(), self.core.topic("set").into());
                    fields.insert("power_command_template".into(), COMMAND_TEMPLATE.into());
                    fields.insert("payload_on".into(), "on".into());
                    fields.insert("payload_off".into(), "off".into());
                }
                HvacFeature::Action => {
                    fields.insert("action_topic".into(), self.core.topic("action/state").into());
                    fields.insert("action_template".into(), "{{ value_json.action }}".into());
                }
                other => self.command_fields(other, &mut fields),
            }
        }

        let lists = [
            (HvacFeature::FanMode, "fan_modes", &self.fan_modes),
            (HvacFeature::SwingMode, "swing_modes", &self.swing_modes),
            (HvacFeature::Mode, "modes", &self.modes),
            (HvacFeature::Preset, "preset_modes", &self.preset_modes),
        ];
        for (feature, key, modes) in lists {
            if self.features.contains(feature) {
                fields.insert(key.into(), json!(modes));
            }
        }

        Value::Object(fields)
    }

    fn handle_message(&mut self, topic: &str, payload: &[u8]) -> Result<(), DecodeError> {
        debug!("Processing message for hvac function {} on {}", self.core.name(), topic);
        let feature = self.command_feature(topic)?;

        let document = parse_json(payload)?;
        let value = match document.get("value") {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Number(number)) => number.to_string(),
            Some(other) => {
                return Err(DecodeError::InvalidValue {
                    field: "value",
                    value: other.to_string(),
                })
            }
            None => return Err(DecodeError::MissingField("value")),
        };
        self.validate(feature, &value)?;

        (self.control)(feature, value);
        Ok(())
    }

    fn publish_status(&self) {
        for feature in HvacFeature::ALL {
            self.publish_feature_status(feature);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Calls = Rc<RefCell<Vec<(HvacFeature, String)>>>;

    fn thermostat(features: HvacFeatures) -> (Hvac, Calls) {
        let calls: Calls = Rc::default();
        let sink = calls.clone();
        let mut hvac = Hvac::new("Heat Pump", move |f, v| sink.borrow_mut().push((f, v)), features)
            .with_modes(["off", "heat", "cool"])
            .with_fan_modes(["auto", "low", "high"]);
        hvac.core_mut().attach("abc_house");
        (hvac, calls)
    }

    #[test]
    fn defaults_match_an_idle_unit() {
        let (hvac, _) = thermostat(HvacFeatures::all());
        assert!(!hvac.power());
        assert_eq!(hvac.mode(), "off");
        assert_eq!(hvac.heating_setpoint(), 18.0);
        assert_eq!(hvac.cooling_setpoint(), 25.0);
        assert_eq!(hvac.humidity_setpoint(), 60.0);
        assert_eq!(hvac.fan_mode(), "auto");
        assert_eq!(hvac.swing_mode(), "off");
        assert_eq!(hvac.action(), HvacAction::Off);
        assert_eq!(hvac.preset_mode(), "none");
        assert_eq!(hvac.last_mode(), "heat");
    }

    #[test]
    fn power_cycle_restores_mode() {
        let (mut hvac, _) = thermostat(HvacFeatures::all());
        for mode in ["heat", "cool", "off", "dry"] {
            hvac.update_device_mode(mode);
            assert_eq!(hvac.power(), mode != "off");
            hvac.update_power_state(false);
            assert_eq!(hvac.mode(), "off");
            assert!(!hvac.power());
            hvac.update_power_state(true);
            assert_eq!(hvac.mode(), mode);
        }
    }

    #[test]
    fn disabled_features_are_ignored() {
        let (mut hvac, _) = thermostat(HvacFeatures::TEMPERATURE | HvacFeatures::MODE_CONTROL);
        assert!(hvac.update_temperature(21.0));
        assert!(!hvac.update_fan_mode("high"));
        assert!(!hvac.update_power_state(true));
        assert_eq!(hvac.fan_mode(), "auto");
        assert_eq!(hvac.temperature(), 21.0);
        assert_eq!(hvac.subscribe_topics(), vec!["home/abc_house/heat_pump/mode/set"]);
    }

    #[test]
    fn commands_reach_callback_with_feature() {
        let (mut hvac, calls) = thermostat(HvacFeatures::all());
        hvac.handle_message(
            "home/abc_house/heat_pump/heating_temperature/set",
            br#"{"value": "21.5" }"#,
        )
        .unwrap();
        hvac.handle_message("home/abc_house/heat_pump/set", br#"{"value":"on"}"#)
            .unwrap();
        hvac.handle_message("home/abc_house/heat_pump/fan_mode/set", br#"{"value":"low"}"#)
            .unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![
                (HvacFeature::HeatingSetpoint, "21.5".to_string()),
                (HvacFeature::Power, "on".to_string()),
                (HvacFeature::FanMode, "low".to_string()),
            ]
        );
        // Commands only request a change.
        assert_eq!(hvac.heating_setpoint(), 18.0);
    }

    #[test]
    fn invalid_commands_are_rejected() {
        let (mut hvac, calls) = thermostat(HvacFeatures::all());
        let base = "home/abc_house/heat_pump/";
        let cases: [(&str, &[u8]); 6] = [
            ("mode/set", br#"{"value":"turbo"}"#),
            ("fan_mode/set", br#"{"value":"medium"}"#),
            ("set", br#"{"value":"ON"}"#),
            ("cooling_temperature/set", br#"{"value":"warm"}"#),
            ("mode/set", br#"{"mode":"heat"}"#),
            ("temperature/measured", br#"{"value":"20"}"#),
        ];
        for (suffix, payload) in cases {
            assert!(hvac.handle_message(&format!("{base}{suffix}"), payload).is_err(), "{suffix}");
        }
        assert!(calls.borrow().is_empty());

        let (mut limited, _) = thermostat(HvacFeatures::TEMPERATURE);
        assert_eq!(
            limited.handle_message(&format!("{base}fan_mode/set"), br#"{"value":"low"}"#),
            Err(DecodeError::FeatureDisabled("fan mode".to_string()))
        );
    }

    #[test]
    fn discovery_is_feature_gated() {
        let (hvac, _) = thermostat(
            HvacFeatures::TEMPERATURE | HvacFeatures::TEMPERATURE_CONTROL_HEATING | HvacFeatures::FAN_MODE,
        );
        let doc = hvac.discovery_payload();
        assert_eq!(doc["current_temperature_topic"], "home/abc_house/heat_pump/temperature/measured");
        assert_eq!(
            doc["temperature_low_command_topic"],
            "home/abc_house/heat_pump/heating_temperature/set"
        );
        assert_eq!(doc["temperature_low_state_template"], "{{ value_json.value }}");
        assert_eq!(doc["fan_modes"], json!(["auto", "low", "high"]));
        assert!(doc.get("modes").is_none());
        assert!(doc.get("power_command_topic").is_none());
        assert!(doc.get("temperature_high_command_topic").is_none());
        assert_eq!(hvac.discovery_topic(), "homeassistant/climate/abc_house/heat_pump/config");
    }

    #[test]
    fn feature_bits_are_stable() {
        assert_eq!(HvacFeatures::all().bits(), 0xF337);
        assert_eq!((HvacFeatures::FAN_MODE | HvacFeatures::ACTION).bits(), 0x4100);
        assert!(HvacFeatures::from_bits(0x2000).contains(HvacFeature::Mode));
        assert_eq!(serde_json::to_value(HvacAction::Drying).unwrap(), json!("drying"));
    }
}
