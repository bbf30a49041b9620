use std::path::PathBuf;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS,
    SubscribeFilter, SubscribeReasonCode,
};
use statum::{machine, state};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message::MQTTMessage;
use super::subscriptions::SubscriptionList;
use crate::bridge::{BridgeEvent, CommandPublisher};
use crate::error::PublishError;

const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Unable to connect to broker at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: ConnectionError,
    },

    #[error("Broker refused the connection: {0:?}")]
    Rejected(ConnectReturnCode),

    #[error("Failed to request subscriptions: {0}")]
    Subscribe(#[from] rumqttc::ClientError),

    #[error("Connection lost while subscribing: {0}")]
    SubscribeLost(#[source] ConnectionError),

    #[error("Invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
}

const NOT_CONNECTED: &str = "broker session is not connected";

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Ready,
}

/// Broker session typestate: Disconnected → Connecting → Connected → Subscribing → Ready.
///
/// The rumqttc event loop only talks to the network while it is polled, so every
/// state that waits on the broker drives `eventloop` itself. Publishes that arrive
/// before the subscription is acknowledged are still forwarded to the bridge.
///
/// `connected` mirrors the broker link for the [`BrokerPublisher`]: true from an
/// accepted CONNACK until the connection drops or the session ends.
#[machine]
pub struct BrokerSession<S: SessionState> {
    client: AsyncClient,
    eventloop: EventLoop,
    config: MqttConfig,
    subscribe_qos: QoS,
    topics_path: PathBuf,
    subscriptions: SubscriptionList,
    events: mpsc::Sender<BridgeEvent>,
    connected: watch::Sender<bool>,
}

impl<S: SessionState> BrokerSession<S> {
    fn filters(&self) -> Vec<SubscribeFilter> {
        self.subscriptions
            .filters()
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), self.subscribe_qos))
            .collect()
    }
}

// `EventLoop` is not `Sync`: only the sender may be borrowed across this await.
async fn forward(events: &mpsc::Sender<BridgeEvent>, message: MQTTMessage) -> bool {
    events.send(BridgeEvent::Broker(message)).await.is_ok()
}

impl BrokerSession<Disconnected> {
    /// Builds the client without touching the network; the returned publisher
    /// shares the session's request queue.
    pub fn create(
        config: MqttConfig,
        subscriptions: SubscriptionList,
        topics_path: PathBuf,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Result<(Self, BrokerPublisher), BrokerError> {
        let subscribe_qos = config
            .subscribe_qos_level()
            .ok_or(BrokerError::InvalidQos(config.subscribe_qos))?;
        let publish_qos = config
            .publish_qos_level()
            .ok_or(BrokerError::InvalidQos(config.publish_qos))?;
        let (client, eventloop) = AsyncClient::new(config.options(), config.request_capacity);
        let (connected, connected_rx) = watch::channel(false);
        let publisher = BrokerPublisher {
            client: client.clone(),
            qos: publish_qos,
            connected: connected_rx,
        };

        debug!("Created MQTT client {} for {}", config.client_id, config.address());
        Ok((
            Self::new(
                client,
                eventloop,
                config,
                subscribe_qos,
                topics_path,
                subscriptions,
                events,
                connected,
            ),
            publisher,
        ))
    }

    /// Connect and subscribe in one go. A failure is written to the log before it
    /// is returned, since it ends the process.
    pub async fn start(self) -> Result<BrokerSession<Ready>, BrokerError> {
        let started = async {
            let session = self.connect().await_connack().await?;
            session.subscribe()?.await_suback().await
        };
        started
            .await
            .inspect_err(|e| error!("Broker session failed to start: {}", e))
    }

    pub fn connect(self) -> BrokerSession<Connecting> {
        info!(
            "Connecting to {} (keep alive {}s)",
            self.config.address(),
            self.config.keep_alive_secs
        );
        self.transition()
    }
}

impl BrokerSession<Connecting> {
    /// Drives the event loop until the broker acknowledges the connection. Any
    /// network error here is final; there is no startup retry.
    pub async fn await_connack(mut self) -> Result<BrokerSession<Connected>, BrokerError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BrokerError::Rejected(ack.code));
                    }
                    info!("Connected with result code {:?}", ack.code);
                    self.connected.send_replace(true);
                    return Ok(self.transition());
                }
                Ok(event) => debug!("Event before CONNACK: {:?}", event),
                Err(source) => {
                    return Err(BrokerError::Connect {
                        address: self.config.address(),
                        source,
                    })
                }
            }
        }
    }
}

impl BrokerSession<Connected> {
    pub fn subscribe(self) -> Result<BrokerSession<Subscribing>, BrokerError> {
        let filters = self.filters();
        if filters.is_empty() {
            warn!("Subscription list is empty, no topics will be received");
        } else {
            self.client.try_subscribe_many(filters)?;
        }
        Ok(self.transition())
    }
}

impl BrokerSession<Subscribing> {
    pub async fn await_suback(mut self) -> Result<BrokerSession<Ready>, BrokerError> {
        if self.subscriptions.is_empty() {
            return Ok(self.transition());
        }

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    log_suback(self.subscriptions.filters(), &ack.return_codes);
                    return Ok(self.transition());
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    forward(&self.events, MQTTMessage::from_publish(&publish)).await;
                }
                Ok(event) => debug!("Event before SUBACK: {:?}", event),
                Err(e) => {
                    self.connected.send_replace(false);
                    return Err(BrokerError::SubscribeLost(e));
                }
            }
        }
    }
}

impl BrokerSession<Ready> {
    /// Forwards broker publishes to the bridge until shutdown or, unless
    /// `reconnect` is enabled, until the connection drops. Publishes are refused
    /// from the moment the link is down.
    pub async fn run(self, shutdown: CancellationToken) -> BrokerSession<Disconnected> {
        info!("Broker session ready");
        let session = self.serve(shutdown).await;
        session.connected.send_replace(false);
        session
    }

    async fn serve(mut self, shutdown: CancellationToken) -> BrokerSession<Disconnected> {
        loop {
            tokio::select! {
                // Shutdown wins over a reconnect attempt that fails immediately.
                biased;

                _ = shutdown.cancelled() => {
                    self.disconnect().await;
                    return self.transition();
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if !forward(&self.events, MQTTMessage::from_publish(&publish)).await {
                            warn!("Bridge is gone, closing broker session");
                            self.disconnect().await;
                            return self.transition();
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!("Reconnected with result code {:?}", ack.code);
                        if ack.code == ConnectReturnCode::Success {
                            self.connected.send_replace(true);
                            self.resubscribe().await;
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        log_suback(self.subscriptions.filters(), &ack.return_codes);
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("Broker sent DISCONNECT");
                    }
                    Ok(event) => debug!("MQTT event: {:?}", event),
                    Err(e) => {
                        warn!("Connection is lost: {}", e);
                        self.connected.send_replace(false);
                        if !self.config.reconnect {
                            return self.transition();
                        }
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }
    }

    async fn resubscribe(&mut self) {
        match SubscriptionList::load(&self.topics_path).await {
            Ok(list) => self.subscriptions = list,
            Err(e) => warn!("Keeping previous subscriptions: {}", e),
        }

        let filters = self.filters();
        if filters.is_empty() {
            return;
        }
        if let Err(e) = self.client.try_subscribe_many(filters) {
            error!("Failed to re-subscribe: {}", e);
        }
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!("Failed to queue DISCONNECT: {}", e);
            return;
        }

        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_FLUSH, flush).await.is_err() {
            warn!("DISCONNECT was not flushed within {:?}", DISCONNECT_FLUSH);
        }
        info!("Disconnected from {}", self.config.address());
    }
}

fn log_suback(filters: &[String], codes: &[SubscribeReasonCode]) {
    for (topic, code) in filters.iter().zip(codes) {
        match code {
            SubscribeReasonCode::Failure => error!("Subscription failed: {}", topic),
            SubscribeReasonCode::Success(qos) => {
                info!("Subscribed to topic {} with {:?}", topic, qos)
            }
        }
    }
}

/// Fire-and-forget publisher handed to the bridge.
///
/// Uses the non-blocking enqueue so the bridge never waits on the network loop.
#[derive(Clone, Debug)]
pub struct BrokerPublisher {
    client: AsyncClient,
    qos: QoS,
    connected: watch::Receiver<bool>,
}

impl BrokerPublisher {
    /// False once the session is gone, even if its last state was connected.
    fn is_connected(&self) -> bool {
        self.connected.has_changed().is_ok() && *self.connected.borrow()
    }
}

impl CommandPublisher for BrokerPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError {
                topic: topic.to_string(),
                reason: NOT_CONNECTED.to_string(),
            });
        }
        self.client
            .try_publish(topic, self.qos, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}
