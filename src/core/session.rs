//! The broker session shared between the connector and the entities it owns.
//!
//! The connector holds the only strong reference. Devices and functions hold a
//! [`SessionLink`], a weak handle that stops working once the connector is
//! dropped or the device is unregistered.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, error};

use crate::core::error::{Error, Result};
use crate::mqtt::BrokerClient;

pub(crate) struct Session {
    pub(crate) client: Box<dyn BrokerClient>,
    pub(crate) connected: bool,
}

impl Session {
    pub(crate) fn new(client: Box<dyn BrokerClient>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Session {
            client,
            connected: false,
        }))
    }

    /// JSON-encodes `payload` and hands it to the client as a retained message.
    pub(crate) fn publish_json(&mut self, topic: &str, payload: &Value) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let bytes = serde_json::to_vec(payload)?;
        self.client.publish(topic, bytes, true)
    }
}

/// Weak handle to the connector's session.
#[derive(Clone, Default)]
pub struct SessionLink {
    session: Weak<RefCell<Session>>,
}

impl std::fmt::Debug for SessionLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLink")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl SessionLink {
    pub(crate) fn new(session: &Rc<RefCell<Session>>) -> Self {
        SessionLink {
            session: Rc::downgrade(session),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.session.strong_count() > 0
    }

    pub(crate) fn publish(&self, topic: &str, payload: &Value) -> Result<()> {
        let session = self.session.upgrade().ok_or_else(|| Error::Detached(topic.to_string()))?;
        let mut session = session.try_borrow_mut().map_err(|_| Error::Publish {
            topic: topic.to_string(),
            reason: "session is busy".to_string(),
        })?;
        session.publish_json(topic, payload)
    }

    /// Publishes and logs instead of returning the failure.
    ///
    /// Messages dropped while disconnected are only logged at debug level, the
    /// full state is republished on the next connect.
    pub(crate) fn publish_logged(&self, topic: &str, payload: &Value) {
        match self.publish(topic, payload) {
            Ok(()) => debug!("Published {} to {}", payload, topic),
            Err(Error::NotConnected) => {
                debug!("Not connected, dropping publish to {}", topic)
            }
            Err(e) => error!("Failed to publish to {}: {}", topic, e),
        }
    }
}
