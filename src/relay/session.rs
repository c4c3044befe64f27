//! Per-session connection handlers
//!
//! One [`StompSessionHandler`] exists per live logical session. It owns the
//! session's TCP connection, tracks STOMP-level connectedness, forwards
//! application frames to the broker, ingests broker frames, and tears the
//! session down on any connectivity failure. The shared system session is
//! the same type with [`SessionRole::System`]: it additionally negotiates
//! heartbeats with the broker, publishes availability events, and surfaces
//! forwarding failures synchronously.

use super::RelayState;
use crate::protocol::{Message, StompCommand, StompHeaderAccessor};
use crate::tcp::{SendFuture, TcpConnection, TcpConnectionHandler};
use crate::{RelayError, Result};
use futures::future;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

// STOMP recommends a margin of error for receiving heartbeats
const HEARTBEAT_MULTIPLIER: u64 = 3;

/// Whether a session terminates a remote client or is the shared system
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Client,
    System,
}

/// Handler for one logical session's connection to the broker.
pub struct StompSessionHandler {
    session_id: String,
    role: SessionRole,
    /// Headers for the outbound CONNECT frame, sealed at construction.
    connect_headers: StompHeaderAccessor,
    /// Present between TCP connect and teardown. Written by TCP event
    /// callbacks, read by forwarding tasks.
    tcp_connection: RwLock<Option<Arc<dyn TcpConnection>>>,
    /// True only between receipt of CONNECTED and teardown.
    stomp_connected: AtomicBool,
    state: Arc<RelayState>,
    me: Weak<StompSessionHandler>,
}

impl StompSessionHandler {
    pub(crate) fn new(
        session_id: String,
        mut connect_headers: StompHeaderAccessor,
        role: SessionRole,
        state: Arc<RelayState>,
    ) -> Arc<Self> {
        connect_headers.set_immutable();
        Arc::new_cyclic(|me| Self {
            session_id,
            role,
            connect_headers,
            tcp_connection: RwLock::new(None),
            stomp_connected: AtomicBool::new(false),
            state,
            me: me.clone(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_client_session(&self) -> bool {
        self.role == SessionRole::Client
    }

    pub fn is_stomp_connected(&self) -> bool {
        self.stomp_connected.load(Ordering::SeqCst)
    }

    /// Forward the given message to the broker.
    ///
    /// The write is initiated before this method returns; the returned
    /// future resolves once it completes and runs the post-send transitions
    /// (teardown after DISCONNECT, failure handling on a failed send).
    ///
    /// If the session is not STOMP-connected, a client message is dropped
    /// with a completed no-op future (losing the TCP connection around the
    /// same time a message is being forwarded is expected; the failure
    /// pipeline already covers the STOMP ERROR), while a system message
    /// fails so that server-originated senders can react.
    ///
    /// Messages may arrive here concurrently with a TCP failure being
    /// processed. There is deliberately no lock around the check-then-send:
    /// the race at worst produces an extra downstream STOMP ERROR, which
    /// consumers must treat idempotently.
    pub fn forward(&self, message: Message) -> SendFuture {
        let connection = match self.tcp_connection.read().clone() {
            Some(connection) if self.is_stomp_connected() => connection,
            connection => {
                if self.is_client_session() {
                    debug!(
                        "Ignoring client message received {} in session '{}'",
                        if connection.is_some() {
                            "before CONNECTED frame"
                        } else {
                            "after TCP connection closed"
                        },
                        self.session_id,
                    );
                    return Box::pin(future::ready(Ok(())));
                }
                let reason = format!(
                    "Cannot forward messages on system connection {}. \
                     Try listening for broker availability events.",
                    if connection.is_some() {
                        "before STOMP CONNECTED frame"
                    } else {
                        "while inactive"
                    },
                );
                return Box::pin(future::ready(Err(RelayError::Delivery(reason))));
            }
        };

        if message.headers().is_heartbeat() {
            trace!("Forwarding heartbeat to broker");
        } else {
            debug!("Forwarding message to broker in session '{}'", self.session_id);
        }

        let command = message.headers().command();
        let send = connection.send(message);
        let me = self.me.clone();

        Box::pin(async move {
            match send.await {
                Ok(()) => {
                    if command == Some(StompCommand::Disconnect) {
                        if let Some(handler) = me.upgrade() {
                            if let Err(e) = handler.clear_connection() {
                                error!("Failed to close connection: {}", e);
                            }
                        }
                    }
                    Ok(())
                }
                Err(e) => {
                    if let Some(handler) = me.upgrade() {
                        // already reset means the failure pipeline ran
                        if handler.tcp_connection.read().is_some() {
                            handler.handle_tcp_connection_failure(
                                &format!("Failed to send message: {}", e),
                                Some(&e),
                            );
                        }
                    }
                    Err(e)
                }
            }
        })
    }

    /// Invoked when any TCP connectivity issue is detected: failure to
    /// establish the connection, failure to send, a missed heartbeat.
    /// Idempotent.
    pub(crate) fn handle_tcp_connection_failure(
        &self,
        error_message: &str,
        cause: Option<&RelayError>,
    ) {
        error!(
            "{}, session '{}'{}",
            error_message,
            self.session_id,
            cause.map(|e| format!(": {}", e)).unwrap_or_default(),
        );
        self.send_stomp_error_to_client(error_message);
        if let Err(e) = self.clear_connection() {
            error!("Failed to close connection: {}", e);
        }
        if self.role == SessionRole::System {
            self.state.availability.publish_unavailable();
        }
    }

    /// Emit a STOMP ERROR frame tagged with this session's id to the client
    /// outbound channel. No-op for the system session.
    fn send_stomp_error_to_client(&self, error_text: &str) {
        if !self.is_client_session() {
            return;
        }
        let mut headers = StompHeaderAccessor::for_command(StompCommand::Error);
        if let Some(initializer) = &self.state.header_initializer {
            initializer(&mut headers);
        }
        headers.set_session_id(&self.session_id);
        headers.set_message(error_text);
        headers.set_immutable();
        self.send_message_to_client(Message::empty(headers));
    }

    fn send_message_to_client(&self, message: Message) {
        if !self.is_client_session() {
            return;
        }
        if self.state.client_outbound.send(message).is_err() {
            warn!(
                "Client outbound channel closed, dropping message for session '{}'",
                self.session_id,
            );
        }
    }

    /// Invoked after the STOMP CONNECTED frame is received; the connection
    /// is now ready for sending messages to the broker.
    fn after_stomp_connected(&self, connected_headers: &StompHeaderAccessor) {
        self.stomp_connected.store(true, Ordering::SeqCst);
        self.init_heartbeats(connected_headers);
        if self.role == SessionRole::System {
            self.state.availability.publish_available();
        }
    }

    fn init_heartbeats(&self, connected_headers: &StompHeaderAccessor) {
        // Remote clients do their own heartbeat management end-to-end; the
        // relay forwards their frames verbatim.
        if self.is_client_session() {
            return;
        }

        let Some(connection) = self.tcp_connection.read().clone() else {
            return;
        };

        let (write_interval, read_interval) = resolve_heartbeat_intervals(
            self.connect_headers.heartbeat(),
            connected_headers.heartbeat(),
        );

        if let Some(interval) = write_interval {
            let me = self.me.clone();
            connection.on_write_inactivity(
                Box::new(move || {
                    if let Some(handler) = me.upgrade() {
                        handler.send_heartbeat();
                    }
                }),
                interval,
            );
        }

        if let Some(interval) = read_interval {
            let me = self.me.clone();
            connection.on_read_inactivity(
                Box::new(move || {
                    if let Some(handler) = me.upgrade() {
                        handler.handle_tcp_connection_failure(
                            &format!(
                                "No heartbeat from broker for more than {}ms, closing connection",
                                interval.as_millis(),
                            ),
                            None,
                        );
                    }
                }),
                interval,
            );
        }
    }

    fn send_heartbeat(&self) {
        let Some(connection) = self.tcp_connection.read().clone() else {
            return;
        };
        let send = connection.send(Message::heartbeat());
        let me = self.me.clone();
        tokio::spawn(async move {
            if let Err(e) = send.await {
                if let Some(handler) = me.upgrade() {
                    handler.handle_tcp_connection_failure("Failed to send heartbeat", Some(&e));
                }
            }
        });
    }

    /// Release the TCP connection and this session's registry entry.
    ///
    /// Client sessions are removed from the registry; the system session
    /// persists across reconnects. Errors from closing the connection
    /// propagate to the caller.
    pub fn clear_connection(&self) -> Result<()> {
        if self.is_client_session() {
            debug!(
                "Removing session '{}' (total remaining={})",
                self.session_id,
                self.state.registry.len().saturating_sub(1),
            );
            self.state.registry.remove(&self.session_id);
        }

        self.stomp_connected.store(false, Ordering::SeqCst);

        let connection = self.tcp_connection.write().take();
        match connection {
            Some(connection) => connection.close(),
            None => Ok(()),
        }
    }
}

impl TcpConnectionHandler for StompSessionHandler {
    fn after_connected(&self, connection: Arc<dyn TcpConnection>) {
        debug!(
            "Established TCP connection to broker in session '{}'",
            self.session_id,
        );
        *self.tcp_connection.write() = Some(Arc::clone(&connection));

        // One CONNECT frame per TCP connection, built from the sealed
        // header snapshot.
        let send = connection.send(Message::empty(self.connect_headers.clone()));
        let me = self.me.clone();
        tokio::spawn(async move {
            if let Err(e) = send.await {
                if let Some(handler) = me.upgrade() {
                    handler.handle_tcp_connection_failure(
                        "Failed to send STOMP CONNECT frame",
                        Some(&e),
                    );
                }
            }
        });
    }

    fn after_connect_failure(&self, error: RelayError) {
        self.handle_tcp_connection_failure("Failed to connect to message broker", Some(&error));
    }

    fn handle_message(&self, mut message: Message) {
        message.headers_mut().set_session_id(&self.session_id);
        let command = message.headers().command();

        if message.headers().is_heartbeat() {
            trace!("Received broker heartbeat");
        } else if command == Some(StompCommand::Error) {
            error!(
                "Received STOMP ERROR in session '{}': {:?}",
                self.session_id,
                message.headers().message(),
            );
        } else {
            debug!(
                "Received message from broker in session '{}'",
                self.session_id,
            );
        }

        if command == Some(StompCommand::Connected) {
            self.after_stomp_connected(message.headers());
        }

        message.headers_mut().set_immutable();
        self.send_message_to_client(message);
    }

    fn handle_failure(&self, error: RelayError) {
        // Nothing to do unless TCP was ever established
        if self.tcp_connection.read().is_none() {
            return;
        }
        self.handle_tcp_connection_failure("Closing connection after TCP failure", Some(&error));
    }

    fn after_connection_closed(&self) {
        if self.tcp_connection.read().is_none() {
            return;
        }
        debug!(
            "TCP connection to broker closed in session '{}'",
            self.session_id,
        );
        self.send_stomp_error_to_client("Connection to broker closed");
        if let Err(e) = self.clear_connection() {
            error!("Failed to close connection: {}", e);
        }
        if self.role == SessionRole::System {
            self.state.availability.publish_unavailable();
        }
    }
}

impl std::fmt::Debug for StompSessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompSessionHandler")
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .field("stomp_connected", &self.is_stomp_connected())
            .finish()
    }
}

/// Resolve the negotiated heartbeat intervals from this side's CONNECT pair
/// `(cx, cy)` and the broker's CONNECTED pair `(sx, sy)`, all in
/// milliseconds.
///
/// Write interval (this side sends heartbeats): `max(cx, sy)` when both are
/// positive, else disabled. Read inactivity limit (the broker is declared
/// dead): `3 × max(cy, sx)` when both are positive, else disabled.
pub(crate) fn resolve_heartbeat_intervals(
    connect: (u64, u64),
    connected: (u64, u64),
) -> (Option<Duration>, Option<Duration>) {
    let (cx, cy) = connect;
    let (sx, sy) = connected;

    let write = (cx > 0 && sy > 0).then(|| Duration::from_millis(cx.max(sy)));
    let read = (cy > 0 && sx > 0).then(|| Duration::from_millis(cy.max(sx) * HEARTBEAT_MULTIPLIER));
    (write, read)
}
