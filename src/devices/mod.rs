//! Ready-made single-function devices.
//!
//! Each builder returns a [`Device`] carrying one function under a fixed name,
//! so the function can be found again with [`Device::find_function`] or
//! [`Connector::function_mut`](crate::core::Connector::function_mut).

use crate::core::device::Device;
use crate::core::error::Result;
use crate::functions::{
    DimmableLight, Hvac, HvacFeature, HvacFeatures, Number, OnOffLight, Sensor, SensorAttributes,
    Switch,
};

pub const ON_OFF_LIGHT: &str = "on_off_light";
pub const DIMMABLE_LIGHT: &str = "dimmable_light";
pub const SWITCH: &str = "switch";
pub const NUMBER: &str = "number";
pub const HVAC: &str = "hvac";

pub fn on_off_light(
    name: &str,
    unique_id: &str,
    control: impl FnMut(bool) + 'static,
) -> Result<Device> {
    let mut device = Device::new(name, unique_id);
    device.register_function(OnOffLight::new(ON_OFF_LIGHT, control))?;
    Ok(device)
}

pub fn dimmable_light(
    name: &str,
    unique_id: &str,
    control: impl FnMut(bool, f64) + 'static,
) -> Result<Device> {
    let mut device = Device::new(name, unique_id);
    device.register_function(DimmableLight::new(DIMMABLE_LIGHT, control))?;
    Ok(device)
}

pub fn switch(name: &str, unique_id: &str, control: impl FnMut(bool) + 'static) -> Result<Device> {
    let mut device = Device::new(name, unique_id);
    device.register_function(Switch::new(SWITCH, control))?;
    Ok(device)
}

/// Number in `[0, 100]` with a step of 1.
pub fn number(name: &str, unique_id: &str, control: impl FnMut(f64) + 'static) -> Result<Device> {
    let mut device = Device::new(name, unique_id);
    device.register_function(Number::new(NUMBER, control)?)?;
    Ok(device)
}

/// Temperature sensor in °C, the function carries `function_name`.
pub fn temperature_sensor(name: &str, unique_id: &str, function_name: &str) -> Result<Device> {
    let mut device = Device::new(name, unique_id);
    device.register_function(Sensor::new(function_name, SensorAttributes::temperature()))?;
    Ok(device)
}

/// HVAC unit. Mode lists may be empty, in which case any value is accepted.
#[allow(clippy::too_many_arguments)]
pub fn hvac(
    name: &str,
    unique_id: &str,
    control: impl FnMut(HvacFeature, String) + 'static,
    features: HvacFeatures,
    modes: &[&str],
    fan_modes: &[&str],
    swing_modes: &[&str],
    preset_modes: &[&str],
) -> Result<Device> {
    let function = Hvac::new(HVAC, control, features)
        .with_modes(modes.iter().copied())
        .with_fan_modes(fan_modes.iter().copied())
        .with_swing_modes(swing_modes.iter().copied())
        .with_preset_modes(preset_modes.iter().copied());
    let mut device = Device::new(name, unique_id);
    device.register_function(function)?;
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::function::Capability;

    #[test]
    fn builders_use_fixed_function_names() {
        let device = switch("Pump", "abc", |_| {}).unwrap();
        assert_eq!(device.full_id(), "abc_pump");
        assert!(device.find_function(SWITCH).unwrap().as_switch().is_some());

        let device = number("Tank", "abc", |_| {}).unwrap();
        let level = device.find_function(NUMBER).unwrap().as_number().unwrap();
        assert_eq!((level.min(), level.max(), level.step()), (0.0, 100.0, 1.0));

        let device = dimmable_light("Lamp", "abc", |_, _| {}).unwrap();
        assert!(device.find_function(DIMMABLE_LIGHT).unwrap().as_dimmable_light().is_some());

        let device = on_off_light("Porch", "abc", |_| {}).unwrap();
        assert_eq!(
            device.find_function(ON_OFF_LIGHT).unwrap().discovery_topic(),
            "homeassistant/light/abc_porch/on_off_light/config"
        );
    }

    #[test]
    fn temperature_sensor_keeps_function_name() {
        let device = temperature_sensor("Weather", "abc", "Outside").unwrap();
        let sensor = device.find_function("outside").unwrap().as_sensor().unwrap();
        assert_eq!(sensor.attributes(), &SensorAttributes::temperature());
    }

    #[test]
    fn hvac_carries_mode_lists() {
        let device = hvac(
            "Heat Pump",
            "abc",
            |_, _| {},
            HvacFeatures::MODE_CONTROL | HvacFeatures::FAN_MODE,
            &["off", "heat"],
            &["auto", "low"],
            &[],
            &[],
        )
        .unwrap();
        let unit = device.find_function(HVAC).unwrap().as_hvac().unwrap();
        assert_eq!(unit.modes(), ["off", "heat"]);
        assert_eq!(unit.fan_modes(), ["auto", "low"]);
        assert_eq!(unit.last_mode(), "heat");
    }
}
