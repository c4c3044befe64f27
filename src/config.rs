//! Relay configuration

use crate::protocol::StompHeaderAccessor;
use crate::tcp::{TcpClient, TcpClientFactory};
use crate::{RelayError, Result};
use std::fmt;
use std::sync::Arc;

/// Hook applied to the headers of messages the relay creates for the client
/// outbound channel (currently the STOMP ERROR frames emitted on session
/// failures).
pub type HeaderInitializer = Arc<dyn Fn(&mut StompHeaderAccessor) + Send + Sync>;

/// Relay configuration
///
/// All intervals are in milliseconds; a heartbeat interval of zero disables
/// that direction.
#[derive(Clone)]
pub struct RelayConfig {
    /// STOMP message broker host
    pub relay_host: String,
    /// STOMP message broker port
    pub relay_port: u16,
    /// Login injected into client CONNECT frames before forwarding
    pub client_login: String,
    /// Passcode injected into client CONNECT frames before forwarding
    pub client_passcode: String,
    /// Login for the shared system connection
    pub system_login: String,
    /// Passcode for the shared system connection
    pub system_passcode: String,
    /// Interval at which the system connection sends heartbeats to the
    /// broker in the absence of other traffic (0 disables)
    pub system_heartbeat_send_interval: u64,
    /// Maximum interval at which the system connection expects to receive
    /// heartbeats from the broker (0 disables)
    pub system_heartbeat_receive_interval: u64,
    /// When set, overrides the STOMP `host` header on every CONNECT frame
    pub virtual_host: Option<String>,
    /// Destination prefixes this relay is responsible for; when empty, all
    /// destinations pass
    pub destination_prefixes: Vec<String>,
    /// Injected TCP client; when absent, one is created through
    /// `tcp_client_factory`
    pub tcp_client: Option<Arc<dyn TcpClient>>,
    /// Factory used to build the default TCP client for
    /// `(relay_host, relay_port)` when no client is injected
    pub tcp_client_factory: Option<Arc<dyn TcpClientFactory>>,
    /// Hook applied to headers of relay-created outbound messages
    pub header_initializer: Option<HeaderInitializer>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay_host: "127.0.0.1".to_string(),
            relay_port: 61613,
            client_login: "guest".to_string(),
            client_passcode: "guest".to_string(),
            system_login: "guest".to_string(),
            system_passcode: "guest".to_string(),
            system_heartbeat_send_interval: 10_000,
            system_heartbeat_receive_interval: 10_000,
            virtual_host: None,
            destination_prefixes: Vec::new(),
            tcp_client: None,
            tcp_client_factory: None,
            header_initializer: None,
        }
    }
}

impl RelayConfig {
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::new()
    }

    /// Check mandatory fields. `system_passcode` may be empty.
    pub fn validate(&self) -> Result<()> {
        if self.relay_host.is_empty() {
            return Err(RelayError::Config("relay_host must not be empty".into()));
        }
        if self.client_login.is_empty() {
            return Err(RelayError::Config("client_login must not be empty".into()));
        }
        if self.client_passcode.is_empty() {
            return Err(RelayError::Config(
                "client_passcode must not be empty".into(),
            ));
        }
        if self.system_login.is_empty() {
            return Err(RelayError::Config("system_login must not be empty".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("relay_host", &self.relay_host)
            .field("relay_port", &self.relay_port)
            .field("client_login", &self.client_login)
            .field("system_login", &self.system_login)
            .field(
                "system_heartbeat_send_interval",
                &self.system_heartbeat_send_interval,
            )
            .field(
                "system_heartbeat_receive_interval",
                &self.system_heartbeat_receive_interval,
            )
            .field("virtual_host", &self.virtual_host)
            .field("destination_prefixes", &self.destination_prefixes)
            .field("tcp_client", &self.tcp_client.as_ref().map(|_| "<set>"))
            .field(
                "tcp_client_factory",
                &self.tcp_client_factory.as_ref().map(|_| "<set>"),
            )
            .finish()
    }
}

/// Builder for [`RelayConfig`]
#[derive(Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relay_host<S: Into<String>>(mut self, relay_host: S) -> Self {
        self.config.relay_host = relay_host.into();
        self
    }

    pub fn relay_port(mut self, relay_port: u16) -> Self {
        self.config.relay_port = relay_port;
        self
    }

    pub fn client_login<S: Into<String>>(mut self, login: S) -> Self {
        self.config.client_login = login.into();
        self
    }

    pub fn client_passcode<S: Into<String>>(mut self, passcode: S) -> Self {
        self.config.client_passcode = passcode.into();
        self
    }

    pub fn system_login<S: Into<String>>(mut self, login: S) -> Self {
        self.config.system_login = login.into();
        self
    }

    pub fn system_passcode<S: Into<String>>(mut self, passcode: S) -> Self {
        self.config.system_passcode = passcode.into();
        self
    }

    pub fn system_heartbeat_send_interval(mut self, interval_ms: u64) -> Self {
        self.config.system_heartbeat_send_interval = interval_ms;
        self
    }

    pub fn system_heartbeat_receive_interval(mut self, interval_ms: u64) -> Self {
        self.config.system_heartbeat_receive_interval = interval_ms;
        self
    }

    pub fn virtual_host<S: Into<String>>(mut self, virtual_host: S) -> Self {
        self.config.virtual_host = Some(virtual_host.into());
        self
    }

    pub fn destination_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.destination_prefixes = prefixes.into_iter().map(|s| s.into()).collect();
        self
    }

    pub fn tcp_client(mut self, tcp_client: Arc<dyn TcpClient>) -> Self {
        self.config.tcp_client = Some(tcp_client);
        self
    }

    pub fn tcp_client_factory(mut self, factory: Arc<dyn TcpClientFactory>) -> Self {
        self.config.tcp_client_factory = Some(factory);
        self
    }

    pub fn header_initializer(mut self, initializer: HeaderInitializer) -> Self {
        self.config.header_initializer = Some(initializer);
        self
    }

    pub fn build(self) -> RelayConfig {
        self.config
    }
}
