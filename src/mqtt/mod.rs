//! # Broker client seam
//!
//! Everything the connector needs from an MQTT client, behind one trait, so the
//! device model and the reconnect logic never touch a concrete client type.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address, credentials and session tuning
//! ├── message_manager.rs  - Inbound/outbound message and last-will types
//! ├── mqtt_handler.rs     - rumqttc-backed client
//! └── memory.rs           - In-memory loopback client for tests and dry runs
//! ```
//!
//! ## Contract
//!
//! - `connect` opens a fresh session and returns only once the broker has
//!   acknowledged it (or failed to). A previous session is dropped first.
//! - `subscribe` and `publish` queue requests on the open session. They never
//!   block for the network round trip.
//! - `poll` drives the network loop for at most `timeout` and returns the
//!   next inbound event, or `None` if nothing arrived in time. An `Err` means
//!   the session is gone.
//! - `idle` is how the connector waits while disconnected. It defaults to a
//!   plain sleep.

pub mod config;
pub mod memory;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::MqttConfig;
pub use memory::MemoryBroker;
pub use message_manager::{InboundMessage, LastWill, OutboundMessage};
pub use mqtt_handler::{ConnectionState, RumqttClient};

use crate::core::error::Result;
use std::time::Duration;

/// Something the broker sent us.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// A publish on one of our subscriptions
    Message(InboundMessage),
    /// Any other inbound packet (acks, ping responses)
    Ack,
}

/// Minimal MQTT client surface used by the connector.
pub trait BrokerClient {
    /// Opens a new session with `last_wills` installed before the handshake.
    fn connect(&mut self, last_wills: &[LastWill]) -> Result<()>;

    /// Closes the session, if any.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, topic: &str) -> Result<()>;

    fn publish(&mut self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;

    fn poll(&mut self, timeout: Duration) -> Result<Option<BrokerEvent>>;

    fn idle(&mut self, timeout: Duration) {
        std::thread::sleep(timeout);
    }

    /// `host:port` of the broker, for log lines.
    fn endpoint(&self) -> String;
}
