//! # MQTT Integration Module
//!
//! Broker side of the bridge: one long-lived session against a Wiren Board style
//! device tree (`/devices/<device>/controls/<control>`).
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs         - Broker address, client id, QoS and reconnect policy
//! ├── message.rs        - Received message representation
//! ├── mqtt_handler.rs   - Session state machine and the outbound publisher
//! ├── subscriptions.rs  - Topic filter list read from the topics file
//! └── topic.rs          - Device/control topic grammar
//! ```
//!
//! ## Session Lifecycle
//!
//! ```text
//! Disconnected ─connect()─► Connecting ─await_connack()─► Connected
//!      ▲                                                      │
//!      │                                                 subscribe()
//!      │                                                      ▼
//!      └──────────── run() ◄── Ready ◄──await_suback()── Subscribing
//! ```
//!
//! Every publish received after the first CONNACK is forwarded to the bridge actor
//! as a [`BridgeEvent::Broker`](crate::bridge::BridgeEvent::Broker). Outbound
//! commands go through [`BrokerPublisher`](mqtt_handler::BrokerPublisher), which
//! only ever queues requests and never waits on the event loop. It refuses them
//! while the link is down or once the session has ended.
//!
//! A connection failure during startup is fatal. Once running, a lost
//! connection is logged and either ends the session or, with
//! `mqtt.reconnect = true`, is retried; every new CONNACK re-reads the topics
//! file and subscribes again.

pub mod config;
pub mod message;
pub mod mqtt_handler;
pub mod subscriptions;
pub mod topic;
