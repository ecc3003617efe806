//! Error types shared by the device model and the connector.

use thiserror::Error;

/// Errors surfaced to the hosting application.
///
/// Configuration errors are raised synchronously while devices and functions
/// are being set up. Run-time faults on the broker link are reported through
/// the `Publish`, `Subscribe` and `Connect` variants and are usually logged by
/// the connector instead of being returned.
#[derive(Debug, Error)]
pub enum Error {
    /// Two functions on one device share a sanitized name
    #[error("device `{device}` already has a function named `{name}`")]
    DuplicateCapability { device: String, name: String },

    /// Two devices on one connector share a sanitized name and unique id
    #[error("a device named `{name}` with id `{id}` is already registered")]
    DuplicateDevice { name: String, id: String },

    /// A command topic shows up twice within one device
    #[error("device `{device}` subscribes to `{topic}` more than once")]
    DuplicateTopic { device: String, topic: String },

    /// A discovery topic shows up twice within one device
    #[error("device `{device}` announces `{topic}` more than once")]
    DuplicateDiscoveryTopic { device: String, topic: String },

    /// A bounded number was declared with a step that is not positive
    #[error("number `{name}` needs a positive step size")]
    ZeroStep { name: String },

    #[error("number `{name}` has an empty range [{min}, {max}]")]
    InvalidBounds { name: String, min: f64, max: f64 },

    /// The device or function has not been registered yet
    #[error("`{0}` is not registered with a connector")]
    Detached(String),

    /// No live broker session to hand the message to
    #[error("not connected to the MQTT broker")]
    NotConnected,

    #[error("failed to publish to `{topic}`: {reason}")]
    Publish { topic: String, reason: String },

    #[error("failed to subscribe to `{topic}`: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to read config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons an inbound command is dropped.
///
/// These never leave the library: the function that received the message logs
/// the error and leaves its state untouched.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("payload has no `{0}` field")]
    MissingField(&'static str),

    #[error("`{field}` has unexpected value `{value}`")]
    InvalidValue { field: &'static str, value: String },

    #[error("`{0}` is not a number")]
    NotANumber(String),

    #[error("feature {0} is not enabled")]
    FeatureDisabled(String),

    #[error("topic `{0}` is not handled here")]
    UnknownTopic(String),
}
