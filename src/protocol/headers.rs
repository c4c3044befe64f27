//! Message headers and the mutable header accessor
//!
//! A [`StompHeaderAccessor`] is a typed view over a message's headers. It is
//! mutable while a message travels through the relay and is sealed with
//! [`StompHeaderAccessor::set_immutable`] before the message is handed to
//! downstream subscribers, so consumers on other tasks can never race a
//! late mutation.

use super::{SimpMessageType, StompCommand, HEARTBEAT_PAYLOAD};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::OnceLock;

const DESTINATION: &str = "destination";
const LOGIN: &str = "login";
const PASSCODE: &str = "passcode";
const HOST: &str = "host";
const ACCEPT_VERSION: &str = "accept-version";
const HEARTBEAT: &str = "heart-beat";
const SESSION: &str = "session";
const MESSAGE: &str = "message";

/// Typed, seal-able view over a message's STOMP headers.
///
/// An accessor carrying a command is "STOMP-typed"; one carrying only a
/// [`SimpMessageType`] is a generic simple-messaging accessor, and the relay
/// derives the client-side STOMP command from the type when it dispatches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompHeaderAccessor {
    command: Option<StompCommand>,
    message_type: SimpMessageType,
    headers: HashMap<String, String>,
    mutable: bool,
}

impl StompHeaderAccessor {
    /// Create a mutable accessor for the given STOMP command.
    pub fn for_command(command: StompCommand) -> Self {
        Self {
            command: Some(command),
            message_type: command.message_type(),
            headers: HashMap::new(),
            mutable: true,
        }
    }

    /// Create a generic simple-messaging accessor with no STOMP command.
    pub fn for_message_type(message_type: SimpMessageType) -> Self {
        Self {
            command: None,
            message_type,
            headers: HashMap::new(),
            mutable: true,
        }
    }

    /// Create the accessor for a heartbeat frame.
    pub fn for_heartbeat() -> Self {
        Self::for_message_type(SimpMessageType::Heartbeat)
    }

    pub fn command(&self) -> Option<StompCommand> {
        self.command
    }

    pub fn message_type(&self) -> SimpMessageType {
        self.message_type
    }

    /// Whether this accessor describes a heartbeat frame.
    pub fn is_heartbeat(&self) -> bool {
        self.command.is_none() && self.message_type == SimpMessageType::Heartbeat
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Seal the accessor. Subsequent setter calls are ignored.
    pub fn set_immutable(&mut self) {
        self.mutable = false;
    }

    /// Set the STOMP command, updating the message type to match.
    pub fn set_command(&mut self, command: StompCommand) {
        if !self.mutable {
            return;
        }
        self.command = Some(command);
        self.message_type = command.message_type();
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        if !self.mutable {
            return;
        }
        self.headers.insert(name.to_string(), value.to_string());
    }

    pub fn session_id(&self) -> Option<&str> {
        self.get(SESSION)
    }

    pub fn set_session_id(&mut self, session_id: &str) {
        self.set_header(SESSION, session_id);
    }

    pub fn destination(&self) -> Option<&str> {
        self.get(DESTINATION)
    }

    pub fn set_destination(&mut self, destination: &str) {
        self.set_header(DESTINATION, destination);
    }

    pub fn login(&self) -> Option<&str> {
        self.get(LOGIN)
    }

    pub fn set_login(&mut self, login: &str) {
        self.set_header(LOGIN, login);
    }

    pub fn passcode(&self) -> Option<&str> {
        self.get(PASSCODE)
    }

    pub fn set_passcode(&mut self, passcode: &str) {
        self.set_header(PASSCODE, passcode);
    }

    pub fn host(&self) -> Option<&str> {
        self.get(HOST)
    }

    pub fn set_host(&mut self, host: &str) {
        self.set_header(HOST, host);
    }

    pub fn accept_version(&self) -> Option<&str> {
        self.get(ACCEPT_VERSION)
    }

    pub fn set_accept_version(&mut self, accept_version: &str) {
        self.set_header(ACCEPT_VERSION, accept_version);
    }

    /// The negotiated heartbeat pair `(send_interval, receive_interval)` in
    /// milliseconds. Absent or malformed headers read as `(0, 0)`, i.e.
    /// heartbeats disabled.
    pub fn heartbeat(&self) -> (u64, u64) {
        let Some(value) = self.get(HEARTBEAT) else {
            return (0, 0);
        };
        let mut parts = value.splitn(2, ',');
        let sx = parts.next().and_then(|v| v.trim().parse().ok());
        let sy = parts.next().and_then(|v| v.trim().parse().ok());
        match (sx, sy) {
            (Some(sx), Some(sy)) => (sx, sy),
            _ => (0, 0),
        }
    }

    pub fn set_heartbeat(&mut self, send_interval: u64, receive_interval: u64) {
        let value = format!("{},{}", send_interval, receive_interval);
        self.set_header(HEARTBEAT, &value);
    }

    /// The human-readable `message` header carried by ERROR frames.
    pub fn message(&self) -> Option<&str> {
        self.get(MESSAGE)
    }

    pub fn set_message(&mut self, message: &str) {
        self.set_header(MESSAGE, message);
    }
}

/// A message: a payload plus its header accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    headers: StompHeaderAccessor,
    payload: Bytes,
}

static HEARTBEAT_MESSAGE: OnceLock<Message> = OnceLock::new();

impl Message {
    pub fn new(headers: StompHeaderAccessor, payload: Bytes) -> Self {
        Self { headers, payload }
    }

    /// A message with the given headers and an empty payload.
    pub fn empty(headers: StompHeaderAccessor) -> Self {
        Self::new(headers, Bytes::new())
    }

    /// The heartbeat frame: single-newline payload, sealed heartbeat headers.
    /// Built once and cloned per send.
    pub fn heartbeat() -> Self {
        HEARTBEAT_MESSAGE
            .get_or_init(|| {
                let mut headers = StompHeaderAccessor::for_heartbeat();
                headers.set_immutable();
                Self::new(headers, Bytes::from_static(HEARTBEAT_PAYLOAD))
            })
            .clone()
    }

    pub fn headers(&self) -> &StompHeaderAccessor {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut StompHeaderAccessor {
        &mut self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}
