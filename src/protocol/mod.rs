//! In-process STOMP frame model
//!
//! Commands, header accessors and messages as they travel between the
//! application channels and the TCP client adapter. Byte-level framing is
//! the external codec's concern; nothing here touches the wire format
//! beyond the distinguished single-newline heartbeat payload.

mod headers;

pub use headers::{Message, StompHeaderAccessor};

/// The distinguished STOMP heartbeat payload: a single newline byte.
pub const HEARTBEAT_PAYLOAD: &[u8] = b"\n";

/// STOMP frame commands, client-to-broker and broker-to-client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    // client
    Stomp,
    Connect,
    Send,
    Subscribe,
    Unsubscribe,
    Begin,
    Commit,
    Abort,
    Ack,
    Nack,
    Disconnect,
    // broker
    Connected,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    /// Whether a frame with this command must carry a `destination` header.
    pub fn requires_destination(&self) -> bool {
        matches!(self, Self::Send | Self::Subscribe | Self::Message)
    }

    /// The client-side command implied by a generic simple-messaging type,
    /// used when a message reaches the relay without an explicit STOMP
    /// command (e.g. MESSAGE-typed application sends become SEND frames).
    pub fn for_client_message(message_type: SimpMessageType) -> Option<Self> {
        match message_type {
            SimpMessageType::Connect => Some(Self::Connect),
            SimpMessageType::Disconnect => Some(Self::Disconnect),
            SimpMessageType::Message => Some(Self::Send),
            SimpMessageType::Subscribe => Some(Self::Subscribe),
            SimpMessageType::Unsubscribe => Some(Self::Unsubscribe),
            _ => None,
        }
    }

    /// The simple-messaging type corresponding to this command.
    pub fn message_type(&self) -> SimpMessageType {
        match self {
            Self::Stomp | Self::Connect => SimpMessageType::Connect,
            Self::Connected => SimpMessageType::ConnectAck,
            Self::Send | Self::Message => SimpMessageType::Message,
            Self::Subscribe => SimpMessageType::Subscribe,
            Self::Unsubscribe => SimpMessageType::Unsubscribe,
            Self::Disconnect => SimpMessageType::Disconnect,
            Self::Receipt | Self::Begin | Self::Commit | Self::Abort | Self::Ack | Self::Nack => {
                SimpMessageType::Other
            }
            Self::Error => SimpMessageType::Other,
        }
    }

    /// The wire name of this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stomp => "STOMP",
            Self::Connect => "CONNECT",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for StompCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic simple-messaging message types, independent of STOMP framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpMessageType {
    Connect,
    ConnectAck,
    Message,
    Subscribe,
    Unsubscribe,
    Heartbeat,
    Disconnect,
    DisconnectAck,
    Other,
}
