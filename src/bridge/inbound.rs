use tracing::{debug, info};

use super::{Bridge, CommandPublisher};
use crate::error::BridgeError;
use crate::mqtt::message::MQTTMessage;
use crate::mqtt::topic::DeviceTopic;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Empty payload; nothing logged, nothing stored.
    Empty,
    /// Topic outside the device/control grammar.
    Discarded,
    Stored {
        port: String,
        device: String,
        control: String,
    },
}

impl<P: CommandPublisher> Bridge<P> {
    /// Files a broker message under `mirror[port][device][control]` and rewrites
    /// the mirror file before returning. The payload is stored as received.
    pub async fn handle_inbound(
        &mut self,
        message: &MQTTMessage,
    ) -> Result<InboundOutcome, BridgeError> {
        if !message.has_payload() {
            return Ok(InboundOutcome::Empty);
        }

        info!("{}", message);

        let Some(topic) = DeviceTopic::parse(&message.topic) else {
            debug!("Not a device control topic: {}", message.topic);
            return Ok(InboundOutcome::Discarded);
        };

        let port = self.routing.route(topic.device).to_string();
        self.mirror
            .set(&port, topic.device, topic.control, message.payload.as_str());
        self.mirror.save(&self.mirror_path).await?;

        Ok(InboundOutcome::Stored {
            port,
            device: topic.device.to_string(),
            control: topic.control.to_string(),
        })
    }
}
