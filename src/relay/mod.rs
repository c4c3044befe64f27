//! Relay controller and session handling
//!
//! The [`StompBrokerRelay`] receives application messages, classifies them,
//! and routes each to the session handler owning the matching TCP connection
//! to the broker. A CONNECT message opens a new connection dedicated to the
//! originating session; messages without a session id ride the shared
//! system connection.

pub mod session;

pub(crate) mod registry;

pub use session::{SessionRole, StompSessionHandler};

use crate::config::{HeaderInitializer, RelayConfig};
use crate::events::{BrokerAvailabilityPublisher, BrokerEvent};
use crate::protocol::{Message, SimpMessageType, StompCommand, StompHeaderAccessor};
use crate::tcp::{FixedIntervalReconnectStrategy, TcpClient};
use crate::{RelayError, Result};
use parking_lot::RwLock;
use registry::SessionRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// Reserved session id for the shared system connection.
pub const SYSTEM_SESSION_ID: &str = "stompRelaySystemSessionId";

/// Interval between reconnect attempts for the system connection.
const RECONNECT_INTERVAL_MS: u64 = 5_000;

/// Bounded wait for the TCP client to shut down.
const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// State shared between the relay controller and its session handlers. The
/// relay outlives every handler; handlers reach back through this rather
/// than owning the relay.
pub(crate) struct RelayState {
    pub(crate) registry: SessionRegistry,
    pub(crate) client_outbound: mpsc::UnboundedSender<Message>,
    pub(crate) availability: BrokerAvailabilityPublisher,
    pub(crate) header_initializer: Option<HeaderInitializer>,
}

/// A message handler that forwards application messages to a STOMP broker
/// over per-session TCP connections.
///
/// Constructed with the channel on which broker frames are published back to
/// clients; [`StompBrokerRelay::start`] subscribes the relay to the client
/// inbound and broker-directed channels and brings up the system connection.
pub struct StompBrokerRelay {
    config: RelayConfig,
    state: Arc<RelayState>,
    tcp_client: RwLock<Option<Arc<dyn TcpClient>>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    me: Weak<StompBrokerRelay>,
}

impl StompBrokerRelay {
    /// Create a relay publishing broker-to-client traffic on
    /// `client_outbound`. Fails if the configuration is invalid.
    pub fn new(
        config: RelayConfig,
        client_outbound: mpsc::UnboundedSender<Message>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let (shutdown_tx, _) = broadcast::channel(4);
        let state = Arc::new(RelayState {
            registry: SessionRegistry::new(),
            client_outbound,
            availability: BrokerAvailabilityPublisher::default(),
            header_initializer: config.header_initializer.clone(),
        });
        Ok(Arc::new_cyclic(|me| Self {
            config,
            state,
            tcp_client: RwLock::new(None),
            running: AtomicBool::new(false),
            shutdown_tx,
            me: me.clone(),
        }))
    }

    /// Subscribe to broker availability events.
    pub fn subscribe_availability(&self) -> broadcast::Receiver<BrokerEvent> {
        self.state.availability.subscribe()
    }

    /// Whether the relay is running and the system session is
    /// STOMP-connected.
    pub fn is_broker_available(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.state.availability.is_available()
    }

    /// Number of registered sessions, including the system session once
    /// started.
    pub fn session_count(&self) -> usize {
        self.state.registry.len()
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.state.registry.contains(session_id)
    }

    /// Start the relay: subscribe to the two application channels, resolve
    /// the TCP client, and initiate the system connection with a
    /// fixed-interval reconnect strategy.
    pub fn start(
        &self,
        client_inbound: mpsc::UnboundedReceiver<Message>,
        broker_messages: mpsc::UnboundedReceiver<Message>,
    ) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RelayError::Config("relay already started".into()));
        }

        let tcp_client = match (
            self.config.tcp_client.clone(),
            self.config.tcp_client_factory.as_ref(),
        ) {
            (Some(client), _) => client,
            (None, Some(factory)) => {
                factory.create(&self.config.relay_host, self.config.relay_port)
            }
            (None, None) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(RelayError::Config(
                    "no TCP client or TCP client factory configured".into(),
                ));
            }
        };
        *self.tcp_client.write() = Some(Arc::clone(&tcp_client));

        self.spawn_dispatch_loop("client inbound", client_inbound);
        self.spawn_dispatch_loop("broker", broker_messages);

        info!(
            "Starting STOMP broker relay for {}:{}",
            self.config.relay_host, self.config.relay_port,
        );
        debug!("Initializing \"system\" connection");

        let mut connect_headers = StompHeaderAccessor::for_command(StompCommand::Connect);
        connect_headers.set_accept_version("1.1,1.2");
        connect_headers.set_login(&self.config.system_login);
        connect_headers.set_passcode(&self.config.system_passcode);
        connect_headers.set_heartbeat(
            self.config.system_heartbeat_send_interval,
            self.config.system_heartbeat_receive_interval,
        );
        if let Some(virtual_host) = &self.config.virtual_host {
            connect_headers.set_host(virtual_host);
        }

        let handler = StompSessionHandler::new(
            SYSTEM_SESSION_ID.to_string(),
            connect_headers,
            SessionRole::System,
            Arc::clone(&self.state),
        );
        self.state
            .registry
            .insert(SYSTEM_SESSION_ID.to_string(), Arc::clone(&handler));

        tcp_client.connect_with_reconnect(
            handler,
            Arc::new(FixedIntervalReconnectStrategy::new(Duration::from_millis(
                RECONNECT_INTERVAL_MS,
            ))),
        );
        Ok(())
    }

    /// Stop the relay: publish broker-unavailable, unsubscribe the dispatch
    /// loops, and shut the TCP client down, waiting a bounded time.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping STOMP broker relay");

        self.state.availability.publish_unavailable();
        let _ = self.shutdown_tx.send(());

        let tcp_client = self.tcp_client.read().clone();
        if let Some(client) = tcp_client {
            match timeout(
                Duration::from_millis(SHUTDOWN_TIMEOUT_MS),
                client.shutdown(),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error while shutting down TCP client: {}", e),
                Err(_) => error!(
                    "Timed out waiting for TCP client shutdown after {}ms",
                    SHUTDOWN_TIMEOUT_MS,
                ),
            }
        }
    }

    fn spawn_dispatch_loop(
        &self,
        channel_name: &'static str,
        mut messages: mpsc::UnboundedReceiver<Message>,
    ) {
        let Some(relay) = self.me.upgrade() else {
            return;
        };
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Unsubscribed from {} channel", channel_name);
                        break;
                    }
                    message = messages.recv() => match message {
                        Some(message) => {
                            if let Err(e) = relay.handle_message(message).await {
                                error!(
                                    "Failed to handle message from {} channel: {}",
                                    channel_name, e,
                                );
                            }
                        }
                        None => {
                            debug!("{} channel closed", channel_name);
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Classify and route one application message.
    ///
    /// System-session forwards are awaited so server-originated senders
    /// observe delivery failures; client-session forwards are
    /// fire-and-forget with completion handling inside the send future.
    pub async fn handle_message(&self, mut message: Message) -> Result<()> {
        let session_id = message.headers().session_id().map(str::to_string);

        if !self.is_broker_available() {
            match session_id.as_deref() {
                None | Some(SYSTEM_SESSION_ID) => {
                    return Err(RelayError::Delivery("Message broker is not active.".into()));
                }
                Some(id) => {
                    if message.headers().message_type() == SimpMessageType::Connect {
                        error!(
                            "Message broker is not active. Ignoring CONNECT from session '{}'",
                            id,
                        );
                    } else {
                        debug!(
                            "Message broker is not active. Ignoring message from session '{}'",
                            id,
                        );
                    }
                    return Ok(());
                }
            }
        }

        // Resolve the STOMP command; generic simple-messaging accessors get
        // the client-side command derived from their message type.
        // Heartbeats legitimately carry no command and pass through.
        let mut command = message.headers().command();
        if command.is_none() {
            let message_type = message.headers().message_type();
            if message_type != SimpMessageType::Heartbeat {
                match StompCommand::for_client_message(message_type) {
                    Some(derived) => {
                        message.headers_mut().set_command(derived);
                        command = Some(derived);
                    }
                    None => {
                        error!(
                            "No STOMP command for message type {:?}. Ignoring message",
                            message_type,
                        );
                        return Ok(());
                    }
                }
            }
        }

        // Messages without a session id originate from the server
        // application and ride the shared system connection.
        let session_id = match session_id {
            Some(id) => id,
            None => {
                if message.headers().message_type() != SimpMessageType::Message {
                    error!("Only STOMP SEND frames supported on \"system\" connection. Ignoring message");
                    return Ok(());
                }
                message.headers_mut().set_session_id(SYSTEM_SESSION_ID);
                SYSTEM_SESSION_ID.to_string()
            }
        };

        if let Some(command) = command {
            if command.requires_destination()
                && !self.check_destination_prefix(message.headers().destination())
            {
                trace!(
                    "Ignoring message to destination={:?}",
                    message.headers().destination(),
                );
                return Ok(());
            }
        }

        trace!("Processing message in session '{}'", session_id);

        match command {
            Some(StompCommand::Connect) => {
                debug!(
                    "Processing CONNECT (total connected={})",
                    self.state.registry.len(),
                );
                {
                    let headers = message.headers_mut();
                    headers.set_login(&self.config.client_login);
                    headers.set_passcode(&self.config.client_passcode);
                    if let Some(virtual_host) = &self.config.virtual_host {
                        headers.set_host(virtual_host);
                    }
                }
                let handler = StompSessionHandler::new(
                    session_id.clone(),
                    message.headers().clone(),
                    SessionRole::Client,
                    Arc::clone(&self.state),
                );
                // A CONNECT for a session id already registered replaces the
                // prior handler; the displaced connection is torn down by
                // its own TCP events, not here.
                self.state.registry.insert(session_id, Arc::clone(&handler));
                self.tcp_client()?.connect(handler);
                Ok(())
            }
            Some(StompCommand::Disconnect) => match self.state.registry.get(&session_id) {
                None => {
                    trace!("Connection already removed for session '{}'", session_id);
                    Ok(())
                }
                Some(handler) => self.forward_to_handler(handler, message).await,
            },
            _ => match self.state.registry.get(&session_id) {
                None => {
                    warn!(
                        "Connection for session '{}' not found. Ignoring message",
                        session_id,
                    );
                    Ok(())
                }
                Some(handler) => self.forward_to_handler(handler, message).await,
            },
        }
    }

    async fn forward_to_handler(
        &self,
        handler: Arc<StompSessionHandler>,
        message: Message,
    ) -> Result<()> {
        let send = handler.forward(message);
        if handler.is_client_session() {
            tokio::spawn(send);
            Ok(())
        } else {
            send.await.map_err(|e| match e {
                RelayError::Delivery(_) => e,
                other => RelayError::Delivery(other.to_string()),
            })
        }
    }

    fn tcp_client(&self) -> Result<Arc<dyn TcpClient>> {
        self.tcp_client
            .read()
            .clone()
            .ok_or_else(|| RelayError::Config("TCP client not initialized".into()))
    }

    /// A destination passes when no prefixes are configured, when the
    /// message has no destination, or when it starts with a configured
    /// prefix.
    fn check_destination_prefix(&self, destination: Option<&str>) -> bool {
        let Some(destination) = destination else {
            return true;
        };
        if self.config.destination_prefixes.is_empty() {
            return true;
        }
        self.config
            .destination_prefixes
            .iter()
            .any(|prefix| destination.starts_with(prefix))
    }
}

impl std::fmt::Debug for StompBrokerRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompBrokerRelay")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("sessions", &self.state.registry.len())
            .finish()
    }
}
