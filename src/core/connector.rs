//! The session manager.
//!
//! A [`Connector`] owns the broker client and every registered [`Device`].
//! Nothing runs in the background: the application calls
//! [`Connector::process_messages`] from its own loop, and that call either
//! drives the network or, while disconnected, the reconnect backoff.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::core::device::Device;
use crate::core::error::{DecodeError, Error, Result};
use crate::core::function::Function;
use crate::core::naming;
use crate::core::session::{Session, SessionLink};
use crate::mqtt::{BrokerClient, BrokerEvent, InboundMessage, LastWill, MqttConfig, RumqttClient};

/// Wait before each reconnect attempt, in milliseconds. The last entry repeats.
pub const BACKOFF_LADDER_MS: [u64; 8] = [1000, 1000, 5000, 5000, 5000, 15000, 30000, 30000];

/// Handle to a device registered with a [`Connector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    /// `retry_index` points into [`BACKOFF_LADDER_MS`], `elapsed` is the time
    /// waited since the last attempt.
    Disconnected { retry_index: usize, elapsed: Duration },
}

impl LinkState {
    const fn fresh_disconnect() -> Self {
        LinkState::Disconnected {
            retry_index: 0,
            elapsed: Duration::ZERO,
        }
    }
}

pub struct Connector {
    session: Rc<RefCell<Session>>,
    devices: BTreeMap<DeviceId, Device>,
    next_id: u64,
    link: LinkState,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("devices", &self.devices)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Connector talking to a real broker.
    pub fn new(config: MqttConfig) -> Self {
        Self::with_client(RumqttClient::new(config))
    }

    pub fn with_client(client: impl BrokerClient + 'static) -> Self {
        Connector {
            session: Session::new(Box::new(client)),
            devices: BTreeMap::new(),
            next_id: 0,
            link: LinkState::fresh_disconnect(),
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    /// Opens the broker session and announces every registered device.
    ///
    /// On failure the connector stays disconnected and
    /// [`process_messages`](Self::process_messages) keeps retrying.
    pub fn connect(&mut self) -> Result<()> {
        match self.open_session() {
            Ok(()) => {
                self.link = LinkState::Connected;
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to {}: {}", self.endpoint(), e);
                self.close_session();
                self.link = LinkState::fresh_disconnect();
                Err(e)
            }
        }
    }

    /// Marks every device offline and closes the session.
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            for device in self.devices.values() {
                device.publish_offline();
            }
        }
        self.close_session();
        self.link = LinkState::fresh_disconnect();
    }

    /// Adds a device and returns its handle.
    ///
    /// Registering while connected reconnects, so the new device's last will,
    /// subscriptions and discovery are part of the fresh session.
    ///
    /// Every device contributes a last will, but [`RumqttClient`] can install
    /// only one per session: the first registered device's. Later devices are
    /// marked offline by [`disconnect`](Self::disconnect) and
    /// [`unregister_device`](Self::unregister_device), not by the broker.
    pub fn register_device(&mut self, mut device: Device) -> Result<DeviceId> {
        if let Some(existing) = self
            .devices
            .values()
            .find(|d| d.full_id() == device.full_id())
        {
            error!(
                "Device {} ({}) is already registered",
                existing.name(),
                existing.full_id()
            );
            return Err(Error::DuplicateDevice {
                name: device.name().to_string(),
                id: device.unique_id().to_string(),
            });
        }
        device.subscribe_topics()?;
        device.discovery_messages()?;

        device.bind(SessionLink::new(&self.session));
        let id = DeviceId(self.next_id);
        self.next_id += 1;
        info!("Registered device {} as {}", device.name(), id);
        self.devices.insert(id, device);

        if self.is_connected() {
            info!("Reconnecting to announce the new device");
            self.close_session();
            if let Err(e) = self.connect() {
                warn!("Reconnect after registering {} failed: {}", id, e);
            }
        }
        Ok(id)
    }

    /// Removes a device. Its retained discovery stays on the broker.
    pub fn unregister_device(&mut self, id: DeviceId) -> Option<Device> {
        let mut device = self.devices.remove(&id)?;
        device.publish_offline();
        device.bind(SessionLink::default());
        info!("Unregistered device {}", device.name());
        Some(device)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &Device)> {
        self.devices.iter().map(|(id, device)| (*id, device))
    }

    /// First device whose name or sanitized name is `name`.
    pub fn find_device(&self, name: &str) -> Option<DeviceId> {
        self.devices
            .iter()
            .find(|(_, d)| d.name() == name || d.clean_name() == name)
            .map(|(id, _)| *id)
    }

    /// Shorthand for `device_mut(id)?.find_function_mut(name)`.
    pub fn function_mut(&mut self, id: DeviceId, name: &str) -> Option<&mut Function> {
        self.devices.get_mut(&id)?.find_function_mut(name)
    }

    /// JSON-encodes `payload` and publishes it retained. Failures are logged.
    pub fn publish_message(&self, topic: &str, payload: &Value) {
        SessionLink::new(&self.session).publish_logged(topic, payload);
    }

    /// Advances the connection for at most `timeout`.
    ///
    /// While connected this polls the broker and dispatches commands to their
    /// devices, returning early after the first command if
    /// `exit_on_first_event` is set. While disconnected it waits `timeout` and
    /// reconnects once the current backoff step has elapsed. Returns the
    /// number of commands dispatched.
    pub fn process_messages(&mut self, timeout: Duration, exit_on_first_event: bool) -> usize {
        match self.link {
            LinkState::Connected => self.pump(timeout, exit_on_first_event),
            LinkState::Disconnected {
                retry_index,
                elapsed,
            } => {
                self.backoff(retry_index, elapsed, timeout);
                0
            }
        }
    }

    fn pump(&mut self, timeout: Duration, exit_on_first_event: bool) -> usize {
        let deadline = Instant::now() + timeout;
        let mut handled = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = self.session.borrow_mut().client.poll(remaining);
            match event {
                Ok(Some(BrokerEvent::Message(message))) => {
                    self.dispatch(&message);
                    handled += 1;
                    if exit_on_first_event {
                        break;
                    }
                }
                Ok(Some(BrokerEvent::Ack)) => {}
                Ok(None) => break,
                Err(e) => {
                    warn!("Connection to {} lost: {}", self.endpoint(), e);
                    self.close_session();
                    self.link = LinkState::fresh_disconnect();
                    break;
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        handled
    }

    fn backoff(&mut self, retry_index: usize, elapsed: Duration, timeout: Duration) {
        self.session.borrow_mut().client.idle(timeout);
        let elapsed = elapsed + timeout;
        let step = Duration::from_millis(BACKOFF_LADDER_MS[retry_index]);
        if elapsed < step {
            self.link = LinkState::Disconnected {
                retry_index,
                elapsed,
            };
            return;
        }

        info!("Reconnecting to {}", self.endpoint());
        match self.open_session() {
            Ok(()) => {
                info!("Reconnected to {}", self.endpoint());
                self.link = LinkState::Connected;
            }
            Err(e) => {
                self.close_session();
                let next = (retry_index + 1).min(BACKOFF_LADDER_MS.len() - 1);
                warn!(
                    "Reconnect failed: {}. Next attempt in {} ms",
                    e, BACKOFF_LADDER_MS[next]
                );
                self.link = LinkState::Disconnected {
                    retry_index: next,
                    elapsed: Duration::ZERO,
                };
            }
        }
    }

    fn dispatch(&mut self, message: &InboundMessage) {
        let topic = message.topic();
        debug!("Received {}", message);
        let Some((full_id, _, _)) = naming::split_topic(topic) else {
            debug!("Ignoring message on unexpected topic {}", topic);
            return;
        };
        let Some(device) = self.devices.values_mut().find(|d| d.full_id() == full_id) else {
            debug!("No device for topic {}", topic);
            return;
        };
        match device.route_message(topic, message.payload()) {
            Ok(()) => {}
            Err(DecodeError::UnknownTopic(_)) => debug!("No function for topic {}", topic),
            Err(e) => error!("Dropping message on {}: {}", topic, e),
        }
    }

    /// Installs the wills, connects, then for each device in registration
    /// order subscribes, publishes discovery and publishes status.
    fn open_session(&mut self) -> Result<()> {
        let wills: Vec<LastWill> = self.devices.values().map(Device::last_will).collect();
        {
            let mut session = self.session.borrow_mut();
            session.connected = false;
            session.client.connect(&wills)?;
            session.connected = true;
        }
        info!("Connected to {}", self.endpoint());

        for device in self.devices.values() {
            let topics = device.subscribe_topics()?;
            {
                let mut session = self.session.borrow_mut();
                for topic in &topics {
                    debug!("Subscribing to {}", topic);
                    session.client.subscribe(topic)?;
                }
            }
            device.publish_discovery()?;
            device.publish_status();
        }
        Ok(())
    }

    fn close_session(&mut self) {
        let mut session = self.session.borrow_mut();
        session.client.disconnect();
        session.connected = false;
    }

    fn endpoint(&self) -> String {
        self.session.borrow().client.endpoint()
    }
}
