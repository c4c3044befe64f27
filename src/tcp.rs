//! TCP client adapter interface
//!
//! The relay core does not open sockets or encode frames itself; it drives
//! an external TCP/codec layer through the traits below. Implementations are
//! expected to decode broker bytes into [`Message`] values and encode
//! outgoing [`Message`] values onto the wire.

use crate::protocol::Message;
use crate::{RelayError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Future resolving when a frame write has completed.
pub type SendFuture = BoxFuture<'static, Result<()>>;

/// A task registered as an inactivity watchdog on a connection.
pub type WatchdogTask = Box<dyn Fn() + Send + Sync>;

/// A live TCP connection to the broker.
pub trait TcpConnection: Send + Sync {
    /// Send a frame to the broker.
    ///
    /// The write MUST be initiated before this method returns (enqueued in
    /// send order); the returned future resolves once the write completes.
    /// This is what guarantees per-connection frame ordering even when the
    /// caller does not await the future.
    fn send(&self, message: Message) -> SendFuture;

    /// Register a task to run whenever no frame has been written for the
    /// given interval. At most one write watchdog per connection; a second
    /// registration replaces the first.
    fn on_write_inactivity(&self, task: WatchdogTask, interval: Duration);

    /// Register a task to run whenever no frame has been read for the given
    /// interval. At most one read watchdog per connection; a second
    /// registration replaces the first.
    fn on_read_inactivity(&self, task: WatchdogTask, interval: Duration);

    /// Close the connection. Idempotent.
    fn close(&self) -> Result<()>;
}

/// Callbacks through which the TCP layer delivers connection lifecycle
/// events and decoded broker frames. Implemented by the relay's session
/// handlers.
pub trait TcpConnectionHandler: Send + Sync {
    /// A TCP connection has been established.
    fn after_connected(&self, connection: Arc<dyn TcpConnection>);

    /// The TCP connect attempt failed.
    fn after_connect_failure(&self, error: RelayError);

    /// A decoded frame arrived from the broker.
    fn handle_message(&self, message: Message);

    /// An asynchronous failure occurred on an established connection.
    fn handle_failure(&self, error: RelayError);

    /// The connection was closed by the peer or the transport.
    fn after_connection_closed(&self);
}

/// The TCP client managing connections to the broker.
pub trait TcpClient: Send + Sync {
    /// Initiate a one-shot connection; lifecycle events and inbound frames
    /// are delivered through the handler.
    fn connect(&self, handler: Arc<dyn TcpConnectionHandler>);

    /// As [`TcpClient::connect`], but on any disconnect or failure the
    /// client re-invokes the connect after the strategy's interval.
    fn connect_with_reconnect(
        &self,
        handler: Arc<dyn TcpConnectionHandler>,
        strategy: Arc<dyn ReconnectStrategy>,
    );

    /// Shut down the client, closing all connections. The returned future
    /// completes when every connection is closed.
    fn shutdown(&self) -> BoxFuture<'static, Result<()>>;
}

/// Constructs a TCP client for a broker address. Injected by the external
/// codec layer so the relay can build its default client from
/// `(relay_host, relay_port)` when no client instance is configured.
pub trait TcpClientFactory: Send + Sync {
    fn create(&self, host: &str, port: u16) -> Arc<dyn TcpClient>;
}

/// Decides how long to wait before a reconnect attempt.
pub trait ReconnectStrategy: Send + Sync {
    /// Time to wait before attempt number `attempt` (starting at 1), or
    /// `None` to stop reconnecting.
    fn next_interval(&self, attempt: u32) -> Option<Duration>;
}

/// Reconnects at a fixed interval, forever.
#[derive(Debug, Clone, Copy)]
pub struct FixedIntervalReconnectStrategy {
    interval: Duration,
}

impl FixedIntervalReconnectStrategy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl ReconnectStrategy for FixedIntervalReconnectStrategy {
    fn next_interval(&self, _attempt: u32) -> Option<Duration> {
        Some(self.interval)
    }
}
