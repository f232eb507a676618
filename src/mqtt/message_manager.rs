use chrono::NaiveDateTime;
use std::fmt;

const PREVIEW_LEN: usize = 10;

/// Message received from the broker
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    topic: String,
    payload: Vec<u8>,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let content = String::from_utf8_lossy(&self.payload);
        let preview: String = content.chars().take(PREVIEW_LEN).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl MqttMessage {
    pub fn from_topic(topic: String, payload: Vec<u8>) -> Self {
        MqttMessage {
            topic,
            payload,
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}
