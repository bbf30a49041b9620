use chrono::{DateTime, Local};
use rumqttc::Publish;
use std::fmt;

/// A message delivered by the broker, decoded for the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MQTTMessage {
    pub topic: String,
    pub payload: String,
    pub received_at: DateTime<Local>,
}

impl MQTTMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        MQTTMessage {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Local::now(),
        }
    }

    /// Payloads are opaque to the bridge; invalid UTF-8 is replaced, not rejected.
    pub fn from_publish(publish: &Publish) -> Self {
        Self::from_topic(
            publish.topic.clone(),
            String::from_utf8_lossy(&publish.payload).into_owned(),
        )
    }

    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.topic, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::QoS;

    #[test]
    fn decodes_publish_packets() {
        let publish = Publish::new("/devices/A1/controls/Relay_1", QoS::AtMostOnce, "1");
        let msg = MQTTMessage::from_publish(&publish);
        assert_eq!(msg.topic, "/devices/A1/controls/Relay_1");
        assert_eq!(msg.payload, "1");
        assert_eq!(msg.to_string(), "/devices/A1/controls/Relay_1 1");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let publish = Publish::new("t", QoS::AtMostOnce, vec![0x66, 0xff, 0x6f]);
        let msg = MQTTMessage::from_publish(&publish);
        assert_eq!(msg.payload, "f\u{fffd}o");
    }

    #[test]
    fn empty_payload_is_detected() {
        assert!(!MQTTMessage::from_topic("/devices/A1/controls/Relay_1", "").has_payload());
    }
}
