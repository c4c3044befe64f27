//! # STOMP Broker Relay
//!
//! A relay core that forwards messages between an application message bus and
//! an upstream STOMP message broker. For each client `CONNECT` message an
//! independent TCP connection to the broker is opened and used exclusively
//! for the session that originated it; frames coming back from the broker are
//! tagged with the session id and published to the client outbound channel.
//!
//! The relay also maintains a shared "system" connection to the broker for
//! messages that originate from the server application itself rather than
//! from a client. The system connection auto-reconnects at a fixed interval,
//! negotiates STOMP heartbeats with the broker, and drives the
//! broker-availability lifecycle events.
//!
//! ## Architecture Overview
//!
//! - [`relay`] - relay controller, session handlers, and the session registry
//! - [`protocol`] - in-process STOMP frame model (commands, headers, messages)
//! - [`tcp`] - the TCP client adapter interface consumed by the core
//! - [`events`] - broker availability lifecycle events
//! - [`config`] - relay configuration
//!
//! The byte-level STOMP codec and the TCP client implementation are external
//! collaborators: the core talks to them exclusively through the traits in
//! [`tcp`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stomp_relay::{RelayConfig, StompBrokerRelay};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> stomp_relay::Result<()> {
//!     let config = RelayConfig::builder()
//!         .relay_host("127.0.0.1")
//!         .relay_port(61613)
//!         .destination_prefixes(vec!["/topic/", "/queue/"])
//!         .build();
//!
//!     let (outbound_tx, _outbound_rx) = mpsc::unbounded_channel();
//!     let (_client_tx, client_rx) = mpsc::unbounded_channel();
//!     let (_broker_tx, broker_rx) = mpsc::unbounded_channel();
//!
//!     let relay = StompBrokerRelay::new(config, outbound_tx)?;
//!     relay.start(client_rx, broker_rx)?;
//!     // ... application runs ...
//!     relay.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod events;
pub mod protocol;
pub mod relay;
pub mod tcp;

pub use config::{HeaderInitializer, RelayConfig, RelayConfigBuilder};
pub use events::{BrokerAvailabilityPublisher, BrokerEvent};
pub use protocol::{Message, SimpMessageType, StompCommand, StompHeaderAccessor};
pub use relay::{SessionRole, StompBrokerRelay, StompSessionHandler, SYSTEM_SESSION_ID};
pub use tcp::{
    FixedIntervalReconnectStrategy, ReconnectStrategy, SendFuture, TcpClient, TcpClientFactory,
    TcpConnection, TcpConnectionHandler, WatchdogTask,
};

use thiserror::Error;

/// Relay error types
///
/// Session-level failures (TCP connect/send failures, closed connections,
/// heartbeat timeouts) are absorbed by the relay and surface downstream as
/// STOMP ERROR frames and availability events; the variants here are the
/// errors callers can observe directly.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or invalid configuration detected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// A message handed to the relay could not be delivered to the broker
    #[error("Message delivery failed: {0}")]
    Delivery(String),

    /// TCP-level failure reported by the external TCP client
    #[error("TCP connection error: {0}")]
    Tcp(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Create a delivery error
    pub fn delivery<S: Into<String>>(message: S) -> Self {
        Self::Delivery(message.into())
    }

    /// Create a TCP error
    pub fn tcp<S: Into<String>>(message: S) -> Self {
        Self::Tcp(message.into())
    }

    /// Check if this error is a connection-level error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Tcp(_) | Self::Io(_))
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
