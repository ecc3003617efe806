//! In-memory loopback broker.
//!
//! Implements [`BrokerClient`] without any network. Clones share one state, so a
//! test can hand one clone to the connector and keep another to inject
//! messages and inspect what was published.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;

use super::message_manager::{InboundMessage, LastWill, OutboundMessage};
use super::{BrokerClient, BrokerEvent};
use crate::core::error::{Error, Result};

#[derive(Debug, Default)]
struct MemoryState {
    connected: bool,
    connect_attempts: usize,
    failing_connects: usize,
    publishes_before_failure: Option<usize>,
    sever_next_poll: bool,
    last_wills: Vec<LastWill>,
    subscriptions: Vec<String>,
    published: Vec<OutboundMessage>,
    inbound: VecDeque<BrokerEvent>,
    idled: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an inbound publish for the next `poll`.
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.state
            .borrow_mut()
            .inbound
            .push_back(BrokerEvent::Message(InboundMessage::from_topic(topic, payload)));
    }

    /// Queues an inbound acknowledgement for the next `poll`.
    pub fn inject_ack(&self) {
        self.state.borrow_mut().inbound.push_back(BrokerEvent::Ack);
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: usize) {
        self.state.borrow_mut().failing_connects = count;
    }

    /// Lets the next `count` publishes through, then fails the one after.
    pub fn fail_publishes_after(&self, count: usize) {
        self.state.borrow_mut().publishes_before_failure = Some(count);
    }

    /// Drops the session on the next `poll`, as if the network went away.
    pub fn sever(&self) {
        self.state.borrow_mut().sever_next_poll = true;
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.borrow().connect_attempts
    }

    /// Last wills installed by the most recent successful connect.
    pub fn last_wills(&self) -> Vec<LastWill> {
        self.state.borrow().last_wills.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.borrow().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<OutboundMessage> {
        self.state.borrow().published.clone()
    }

    /// Everything published on `topic`, oldest first.
    pub fn published_on(&self, topic: &str) -> Vec<OutboundMessage> {
        self.state
            .borrow()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// JSON payload of the most recent publish on `topic`.
    pub fn last_json(&self, topic: &str) -> Option<Value> {
        self.published_on(topic).last().and_then(OutboundMessage::json)
    }

    /// Forgets recorded publishes and subscriptions.
    pub fn clear_history(&self) {
        let mut state = self.state.borrow_mut();
        state.published.clear();
        state.subscriptions.clear();
    }

    /// Total time the connector spent waiting while disconnected.
    pub fn idled(&self) -> Duration {
        self.state.borrow().idled
    }
}

impl BrokerClient for MemoryBroker {
    fn connect(&mut self, last_wills: &[LastWill]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.connect_attempts += 1;
        state.connected = false;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(Error::Connect {
                host: "memory".to_string(),
                port: 0,
                reason: "scripted failure".to_string(),
            });
        }
        state.last_wills = last_wills.to_vec();
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state.borrow_mut().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        match state.publishes_before_failure {
            Some(0) => {
                state.publishes_before_failure = None;
                return Err(Error::Publish {
                    topic: topic.to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
            Some(n) => state.publishes_before_failure = Some(n - 1),
            None => {}
        }
        state.published.push(OutboundMessage {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<Option<BrokerEvent>> {
        let mut state = self.state.borrow_mut();
        if state.sever_next_poll {
            state.sever_next_poll = false;
            state.connected = false;
            return Err(Error::NotConnected);
        }
        if !state.connected {
            return Err(Error::NotConnected);
        }
        Ok(state.inbound.pop_front())
    }

    fn idle(&mut self, timeout: Duration) {
        self.state.borrow_mut().idled += timeout;
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}
