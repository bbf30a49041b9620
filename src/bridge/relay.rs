use tracing::{debug, info, warn};

use super::Bridge;
use crate::error::{BridgeError, PublishError};
use crate::pipe::{self, CommandLine};

/// Outbound side of the broker session.
pub trait CommandPublisher: Send {
    /// Queues a publish. Returns once the request is queued, not delivered.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    Published {
        topic: String,
        payload: String,
        /// Whether the line also matched the four-field command grammar.
        well_formed: bool,
    },
}

impl<P: CommandPublisher> Bridge<P> {
    /// Republishes a pipe line as `<topic> <payload>`, split at the first space.
    ///
    /// The four-field parse is informational unless `require_valid_command` is set.
    pub fn handle_pipe_line(&self, line: &str) -> Result<RelayOutcome, BridgeError> {
        info!("Received message: {}", line);

        let command = CommandLine::parse(line);
        match &command {
            Some(cmd) => debug!(
                "Command port={} device={} control={} value={}",
                cmd.port, cmd.device, cmd.control, cmd.value
            ),
            None => {
                if self.relay.require_valid_command {
                    return Err(BridgeError::MalformedLine {
                        line: line.to_string(),
                        reason: "expected <port>/<device>/<control> <value>",
                    });
                }
                warn!("Line does not match <port>/<device>/<control> <value>, relaying as is");
            }
        }

        let (topic, payload) = pipe::split_line(line).ok_or_else(|| BridgeError::MalformedLine {
            line: line.to_string(),
            reason: "no space between topic and payload",
        })?;

        info!("Publishing message: {} {}", topic, payload);
        self.publisher.publish(topic, payload)?;

        Ok(RelayOutcome::Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            well_formed: command.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::test_support::*;
    use crate::config::RelayConfig;
    use crate::error::ErrorCategory;
    use crate::logging::CapturedLog;

    fn relay(publisher: &RecordingPublisher, require_valid_command: bool) -> Bridge<RecordingPublisher> {
        bridge(
            std::path::PathBuf::from("/nonexistent/conf.json"),
            publisher.clone(),
            RelayConfig {
                require_valid_command,
            },
        )
    }

    #[test]
    fn publishes_even_when_grammar_does_not_match() {
        let publisher = RecordingPublisher::default();
        let outcome = relay(&publisher, false)
            .handle_pipe_line("RS-485-2/A1/Relay_1 true")
            .unwrap();

        assert_eq!(
            outcome,
            RelayOutcome::Published {
                topic: "RS-485-2/A1/Relay_1".into(),
                payload: "true".into(),
                well_formed: false,
            }
        );
        assert_eq!(
            publisher.calls(),
            vec![("RS-485-2/A1/Relay_1".to_string(), "true".to_string())]
        );
    }

    #[test]
    fn payload_keeps_everything_after_the_first_space() {
        let publisher = RecordingPublisher::default();
        relay(&publisher, false)
            .handle_pipe_line("/devices/A1/controls/Relay_1 1 2")
            .unwrap();
        assert_eq!(
            publisher.calls(),
            vec![("/devices/A1/controls/Relay_1".to_string(), "1 2".to_string())]
        );
    }

    #[test]
    fn line_without_space_is_a_parse_error() {
        let publisher = RecordingPublisher::default();
        let err = relay(&publisher, false)
            .handle_pipe_line("Virtual/Cardholder/state")
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Parse);
        assert!(publisher.calls().is_empty());
    }

    #[test]
    fn gate_drops_lines_outside_the_grammar() {
        let publisher = RecordingPublisher::default();
        let bridge = relay(&publisher, true);

        let err = bridge.handle_pipe_line("RS-485-2/A1/Relay_1 true").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);

        let outcome = bridge.handle_pipe_line("Virtual/bedside_switch/enabled 1").unwrap();
        assert!(matches!(outcome, RelayOutcome::Published { well_formed: true, .. }));
        assert_eq!(publisher.calls().len(), 1);
    }

    #[test]
    fn publish_failure_is_reported_not_retried() {
        let publisher = RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        };
        let err = relay(&publisher, false)
            .handle_pipe_line("Virtual/Cardholder/state 1")
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Publish);
    }

    #[test]
    fn logs_receive_and_publish() {
        let log = CapturedLog::default();
        let _guard = tracing::subscriber::set_default(log.subscriber());

        relay(&RecordingPublisher::default(), false)
            .handle_pipe_line("Virtual/Cardholder/state 1")
            .unwrap();

        assert_eq!(
            log.messages(),
            vec![
                "Received message: Virtual/Cardholder/state 1",
                "Publishing message: Virtual/Cardholder/state 1",
            ]
        );
    }
}
