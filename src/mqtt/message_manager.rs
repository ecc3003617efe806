use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the payload preview shown by `Display`.
const PREVIEW_LEN: usize = 32;

/// A message received from the broker on one of the subscribed topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    topic: String,
    payload: Vec<u8>,
    timestamp: NaiveDateTime,
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = String::from_utf8_lossy(&self.payload);
        let preview: String = text.chars().take(PREVIEW_LEN).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl InboundMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

/// A message handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl OutboundMessage {
    /// Payload decoded as JSON, `None` if it is not valid JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

/// The message the broker publishes on our behalf if the session drops uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_truncates_long_payloads() {
        let msg = InboundMessage::from_topic("home/a/b/set", "x".repeat(100));
        let rendered = msg.to_string();
        assert!(rendered.contains("home/a/b/set"));
        assert!(rendered.ends_with(&"x".repeat(PREVIEW_LEN)));
        assert!(!rendered.contains(&"x".repeat(PREVIEW_LEN + 1)));
    }

    #[test]
    fn receive_time_is_stamped() {
        let before = chrono::Local::now().naive_local();
        let msg = InboundMessage::from_topic("t", "ON");
        let after = chrono::Local::now().naive_local();
        assert!(before <= msg.timestamp() && msg.timestamp() <= after);
        assert!(msg.to_string().starts_with(&msg.timestamp().to_string()));
    }

    #[test]
    fn display_handles_short_payloads() {
        let msg = InboundMessage::from_topic("t", "ON");
        assert!(msg.to_string().ends_with("t: ON"));
    }
}
