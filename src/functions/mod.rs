//! The function variants a device can expose.

pub mod dimmable_light;
pub mod hvac;
pub mod number;
pub mod on_off_light;
pub mod sensor;
pub mod switch;

pub use dimmable_light::DimmableLight;
pub use hvac::{Hvac, HvacAction, HvacFeature, HvacFeatures, HvacUpdate};
pub use number::Number;
pub use on_off_light::OnOffLight;
pub use sensor::{Sensor, SensorAttributes, SensorValue};
pub use switch::Switch;
