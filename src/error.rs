//! Error categories shared by every bridge operation.
//!
//! Subsystems keep their own error enums; [`BridgeError`] folds them together so
//! the actor and `main` can log each failure once, tagged with its category.

use crate::config::ConfigError;
use crate::mqtt::mqtt_handler::BrokerError;
use crate::mqtt::subscriptions::SubscriptionError;
use crate::persistence::MirrorError;
use crate::pipe::PipeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Broker unreachable, refused or dropped.
    Transport,
    /// Malformed topic or pipe line.
    Parse,
    /// Pipe creation, mirror or subscription file access.
    Filesystem,
    /// A publish could not be queued.
    Publish,
    /// Invalid settings.
    Config,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Error while publishing to {topic}: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error(transparent)]
    Subscriptions(#[from] SubscriptionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Malformed pipe line {line:?}: {reason}")]
    MalformedLine { line: String, reason: &'static str },
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::Broker(BrokerError::InvalidQos(_)) => ErrorCategory::Config,
            BridgeError::Broker(_) => ErrorCategory::Transport,
            BridgeError::Mirror(_) | BridgeError::Pipe(_) | BridgeError::Subscriptions(_) => {
                ErrorCategory::Filesystem
            }
            BridgeError::Config(_) => ErrorCategory::Config,
            BridgeError::Publish(_) => ErrorCategory::Publish,
            BridgeError::MalformedLine { .. } => ErrorCategory::Parse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let publish = BridgeError::from(PublishError {
            topic: "t".into(),
            reason: "queue full".into(),
        });
        assert_eq!(publish.category(), ErrorCategory::Publish);

        let line = BridgeError::MalformedLine {
            line: "nospace".into(),
            reason: "missing payload",
        };
        assert_eq!(line.category(), ErrorCategory::Parse);

        let pipe = BridgeError::from(PipeError::NotAFifo("/tmp/x".into()));
        assert_eq!(pipe.category(), ErrorCategory::Filesystem);

        let qos = BridgeError::from(BrokerError::InvalidQos(9));
        assert_eq!(qos.category(), ErrorCategory::Config);
    }
}
