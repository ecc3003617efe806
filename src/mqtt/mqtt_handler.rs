use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rumqttc::{
    Client, ClientError, Connection, ConnectReturnCode, Event, MqttOptions, Packet, QoS,
    RecvTimeoutError,
};
use tracing::{debug, error, info, warn};

use super::message_manager::{InboundMessage, LastWill};
use super::{config::MqttConfig, BrokerClient, BrokerEvent};
use crate::core::error::{Error, Result};

/// Attempts to make room in a full request queue before giving up on a publish.
const DRAIN_ATTEMPTS: usize = 50;
const DRAIN_STEP: Duration = Duration::from_millis(20);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// [`BrokerClient`] backed by the synchronous `rumqttc` client.
///
/// A new `Client`/`Connection` pair is built on every `connect`, so the last
/// wills of devices registered since the previous session are always installed.
/// `rumqttc`'s own reconnect-on-poll is never relied on: the first connection
/// error tears the pair down and leaves reconnecting to the connector.
///
/// MQTT allows one will per session. With several devices on one connector
/// only the first registered device's offline marker is installed; the others
/// keep showing `online` after an unclean drop until the connector reconnects
/// or their availability expires in Home Assistant. Use one connector per
/// device when every device must go offline on its own.
pub struct RumqttClient {
    config: MqttConfig,
    state: ConnectionState,
    client: Option<Client>,
    connection: Option<Connection>,
    pending: VecDeque<BrokerEvent>,
}

impl RumqttClient {
    pub fn new(config: MqttConfig) -> Self {
        RumqttClient {
            config,
            state: ConnectionState::default(),
            client: None,
            connection: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    fn options(&self, last_wills: &[LastWill]) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        mqtt_options
            .set_keep_alive(self.config.keep_alive())
            .set_clean_session(true);
        if self.config.has_credentials() {
            mqtt_options.set_credentials(self.config.username.clone(), self.config.password.clone());
        }

        // MQTT carries a single will per session.
        if let Some(will) = last_wills.first() {
            if last_wills.len() > 1 {
                warn!(
                    "Broker accepts one last will per session; installing {} and skipping {} more",
                    will.topic,
                    last_wills.len() - 1
                );
            }
            mqtt_options.set_last_will(rumqttc::LastWill::new(
                will.topic.clone(),
                will.payload.clone(),
                QoS::AtLeastOnce,
                will.retain,
            ));
        }
        mqtt_options
    }

    fn connect_error(&self, reason: impl ToString) -> Error {
        Error::Connect {
            host: self.config.host.clone(),
            port: self.config.port,
            reason: reason.to_string(),
        }
    }

    fn teardown(&mut self) {
        self.client = None;
        self.connection = None;
        self.pending.clear();
    }

    /// Maps one `rumqttc` event. Outgoing traffic is not reported.
    fn translate(event: Event) -> Option<BrokerEvent> {
        match event {
            Event::Incoming(Packet::Publish(publish)) => Some(BrokerEvent::Message(
                InboundMessage::from_topic(publish.topic, publish.payload.to_vec()),
            )),
            Event::Incoming(_) => Some(BrokerEvent::Ack),
            Event::Outgoing(_) => None,
        }
    }

    /// Runs the network loop briefly so queued requests reach the socket.
    /// Inbound events seen meanwhile are kept for the next `poll`.
    fn drain(&mut self) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::NotConnected);
        };
        match connection.recv_timeout(DRAIN_STEP) {
            Ok(Ok(Event::Incoming(Packet::Disconnect))) => Err(Error::NotConnected),
            Ok(Ok(event)) => {
                if let Some(event) = Self::translate(event) {
                    self.pending.push_back(event);
                }
                Ok(())
            }
            Ok(Err(e)) => Err(self.connect_error(e)),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => Err(Error::NotConnected),
        }
    }

    fn lost(&mut self, reason: impl std::fmt::Display) -> Error {
        warn!("Lost connection to {}: {}", self.endpoint(), reason);
        self.state = ConnectionState::Failed;
        self.teardown();
        Error::NotConnected
    }
}

impl BrokerClient for RumqttClient {
    fn connect(&mut self, last_wills: &[LastWill]) -> Result<()> {
        self.teardown();
        self.state = ConnectionState::Connecting;
        info!("Connecting to MQTT server {}", self.endpoint());

        let (client, mut connection) =
            Client::new(self.options(last_wills), self.config.channel_capacity);
        let deadline = Instant::now() + self.config.connect_timeout();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.state = ConnectionState::Failed;
                return Err(self.connect_error("timed out waiting for CONNACK"));
            }
            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    self.state = ConnectionState::Failed;
                    return Err(self.connect_error(format!("broker refused: {:?}", ack.code)));
                }
                Ok(Ok(event)) => debug!("Ignoring {:?} while connecting", event),
                Ok(Err(e)) => {
                    self.state = ConnectionState::Failed;
                    return Err(self.connect_error(e));
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.state = ConnectionState::Failed;
                    return Err(self.connect_error("timed out waiting for CONNACK"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.state = ConnectionState::Failed;
                    return Err(self.connect_error("network loop stopped"));
                }
            }
        }

        info!("Connected to MQTT server {}", self.endpoint());
        self.client = Some(client);
        self.connection = Some(connection);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.client.as_ref() {
            if let Err(e) = client.try_disconnect() {
                debug!("Disconnect request not queued: {}", e);
            }
        }
        // Flush the DISCONNECT packet before dropping the loop.
        if let Some(connection) = self.connection.as_mut() {
            let _ = connection.recv_timeout(DRAIN_STEP);
        }
        if self.state == ConnectionState::Connected {
            info!("Disconnected from MQTT server {}", self.endpoint());
        }
        self.teardown();
        self.state = ConnectionState::Disconnected;
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        let client = self.client.as_ref().ok_or(Error::NotConnected)?;
        client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| Error::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        let mut payload = payload;
        for _ in 0..DRAIN_ATTEMPTS {
            let client = self.client.as_ref().ok_or(Error::NotConnected)?;
            match client.try_publish(topic, QoS::AtLeastOnce, retain, payload) {
                Ok(()) => return Ok(()),
                Err(ClientError::TryRequest(request)) => {
                    // Queue full: recover the payload and let the loop make room.
                    payload = match request {
                        rumqttc::Request::Publish(publish) => publish.payload.to_vec(),
                        _ => Vec::new(),
                    };
                    if let Err(e) = self.drain() {
                        return Err(self.lost(e));
                    }
                }
                Err(e) => {
                    return Err(Error::Publish {
                        topic: topic.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        error!("Request queue stayed full while publishing to {}", topic);
        Err(Error::Publish {
            topic: topic.to_string(),
            reason: "request queue full".to_string(),
        })
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<BrokerEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return Err(Error::NotConnected);
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    return Err(self.lost("broker sent DISCONNECT"))
                }
                Ok(Ok(event)) => {
                    if let Some(event) = Self::translate(event) {
                        return Ok(Some(event));
                    }
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                }
                Ok(Err(e)) => return Err(self.lost(e)),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.lost("network loop stopped"))
                }
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn will(full_id: &str) -> LastWill {
        LastWill {
            topic: format!("home/{full_id}/availability"),
            payload: br#"{"availability":"offline"}"#.to_vec(),
            retain: true,
        }
    }

    #[test]
    fn only_the_first_will_is_installed() {
        let client = RumqttClient::new(MqttConfig::default().with_client_id("test_agent"));
        let options = client.options(&[will("abc_pump"), will("abc_valve")]);
        assert_eq!(options.client_id(), "test_agent");
        let installed = options.last_will().unwrap();
        assert_eq!(installed.topic, "home/abc_pump/availability");
        assert!(installed.retain);

        assert!(client.options(&[]).last_will().is_none());
    }

    #[test]
    fn starts_and_stays_disconnected_without_a_session() {
        let mut client = RumqttClient::new(MqttConfig::default());
        assert_eq!(client.state(), &ConnectionState::Disconnected);
        assert!(!client.is_connected());

        assert!(matches!(client.subscribe("home/a/b/set"), Err(Error::NotConnected)));
        assert!(matches!(
            client.publish("home/a/b/state", Vec::new(), true),
            Err(Error::NotConnected)
        ));
        client.disconnect();
        assert_eq!(client.state(), &ConnectionState::Disconnected);
    }
}
