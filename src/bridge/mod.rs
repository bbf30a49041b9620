//! # Bridge Actor
//!
//! Single owner of the device-state mirror. Both producers feed one channel:
//!
//! ```text
//! broker session (tokio task) ──BridgeEvent::Broker──┐
//!                                                    ├─► Bridge::run ─► mirror file
//! pipe reader (OS thread) ─────BridgeEvent::Pipe─────┘        └──────► broker publish
//! ```
//!
//! Events are handled strictly one at a time, so a mutate-and-persist sequence can
//! never interleave with another. Handlers return explicit outcomes; failures are
//! logged here, tagged with their [`ErrorCategory`](crate::error::ErrorCategory),
//! and the actor moves on to the next event. Running totals are kept in
//! [`BridgeStats`] and handed back with the final mirror.

pub mod inbound;
pub mod relay;

use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::error::BridgeError;
use crate::mqtt::message::MQTTMessage;
use crate::persistence::ConfigMirror;
use crate::routing::RoutingTable;

pub use inbound::InboundOutcome;
pub use relay::{CommandPublisher, RelayOutcome};

#[derive(Debug)]
pub enum BridgeEvent {
    Broker(MQTTMessage),
    Pipe(String),
}

/// Counters since the actor started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Broker messages, including empty and discarded ones.
    pub received: u64,
    pub stored: u64,
    pub discarded: u64,
    /// Pipe lines handed to the publisher.
    pub relayed: u64,
    pub errors: u64,
}

impl fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "received={} stored={} discarded={} relayed={} errors={}",
            self.received, self.stored, self.discarded, self.relayed, self.errors
        )
    }
}

pub struct Bridge<P: CommandPublisher> {
    mirror: ConfigMirror,
    mirror_path: PathBuf,
    routing: RoutingTable,
    publisher: P,
    relay: RelayConfig,
    stats: BridgeStats,
}

impl<P: CommandPublisher> Bridge<P> {
    pub fn new(
        mirror: ConfigMirror,
        mirror_path: PathBuf,
        routing: RoutingTable,
        publisher: P,
        relay: RelayConfig,
    ) -> Self {
        Self {
            mirror,
            mirror_path,
            routing,
            publisher,
            relay,
            stats: BridgeStats::default(),
        }
    }

    #[cfg(test)]
    pub fn mirror(&self) -> &ConfigMirror {
        &self.mirror
    }

    pub async fn handle_event(&mut self, event: BridgeEvent) -> Result<(), BridgeError> {
        let result = match event {
            BridgeEvent::Broker(message) => {
                self.stats.received += 1;
                self.handle_inbound(&message).await.map(|outcome| match outcome {
                    InboundOutcome::Stored { .. } => self.stats.stored += 1,
                    InboundOutcome::Discarded => self.stats.discarded += 1,
                    InboundOutcome::Empty => {}
                })
            }
            BridgeEvent::Pipe(line) => self
                .handle_pipe_line(&line)
                .map(|_| self.stats.relayed += 1),
        };
        if result.is_err() {
            self.stats.errors += 1;
        }
        result
    }

    /// Processes events until shutdown or until every producer is gone, then hands
    /// back the final mirror and the counters.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<BridgeEvent>,
        shutdown: CancellationToken,
    ) -> (ConfigMirror, BridgeStats) {
        info!("Bridge started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            error!("[{:?}] {}", e.category(), e);
                        }
                    }
                    None => break,
                }
            }
        }

        info!("Bridge stopped: {}", self.stats);
        (self.mirror, self.stats)
    }
}
