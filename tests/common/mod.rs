//! Shared test fixtures: a scripted TCP client standing in for the external
//! TCP/codec layer, plus message builders for the common frame shapes.

#![allow(dead_code)]

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use stomp_relay::{
    BrokerEvent, Message, RelayConfig, RelayConfigBuilder, RelayError, ReconnectStrategy, Result,
    SendFuture, SimpMessageType, StompBrokerRelay, StompCommand, StompHeaderAccessor, TcpClient,
    TcpConnection, TcpConnectionHandler, WatchdogTask,
};
use tokio::sync::{broadcast, mpsc};

/// TCP client that records connect requests instead of opening sockets.
/// Tests drive the recorded handlers' callbacks to simulate the broker side.
#[derive(Default)]
pub struct MockTcpClient {
    handlers: Mutex<Vec<Arc<dyn TcpConnectionHandler>>>,
    reconnect_strategy: Mutex<Option<Arc<dyn ReconnectStrategy>>>,
    shutdown_called: AtomicBool,
}

impl MockTcpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect_count(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn handler(&self, index: usize) -> Arc<dyn TcpConnectionHandler> {
        Arc::clone(&self.handlers.lock()[index])
    }

    pub fn last_handler(&self) -> Arc<dyn TcpConnectionHandler> {
        let handlers = self.handlers.lock();
        Arc::clone(handlers.last().expect("no connect was initiated"))
    }

    pub fn reconnect_interval(&self) -> Option<Duration> {
        self.reconnect_strategy
            .lock()
            .as_ref()
            .and_then(|strategy| strategy.next_interval(1))
    }

    pub fn shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::SeqCst)
    }
}

impl TcpClient for MockTcpClient {
    fn connect(&self, handler: Arc<dyn TcpConnectionHandler>) {
        self.handlers.lock().push(handler);
    }

    fn connect_with_reconnect(
        &self,
        handler: Arc<dyn TcpConnectionHandler>,
        strategy: Arc<dyn ReconnectStrategy>,
    ) {
        self.handlers.lock().push(handler);
        *self.reconnect_strategy.lock() = Some(strategy);
    }

    fn shutdown(&self) -> BoxFuture<'static, Result<()>> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Box::pin(future::ready(Ok(())))
    }
}

/// Scripted connection: records sent frames synchronously, captures
/// inactivity watchdog registrations so tests can fire them, and can be
/// told to fail sends.
#[derive(Default)]
pub struct MockConnection {
    sent: Mutex<Vec<Message>>,
    fail_sends: AtomicBool,
    closed: AtomicBool,
    write_watchdog: Mutex<Option<(WatchdogTask, Duration)>>,
    read_watchdog: Mutex<Option<(WatchdogTask, Duration)>>,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent_frames(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn write_watchdog_interval(&self) -> Option<Duration> {
        self.write_watchdog.lock().as_ref().map(|(_, i)| *i)
    }

    pub fn read_watchdog_interval(&self) -> Option<Duration> {
        self.read_watchdog.lock().as_ref().map(|(_, i)| *i)
    }

    pub fn fire_write_watchdog(&self) {
        if let Some((task, _)) = &*self.write_watchdog.lock() {
            task();
        }
    }

    pub fn fire_read_watchdog(&self) {
        if let Some((task, _)) = &*self.read_watchdog.lock() {
            task();
        }
    }
}

impl TcpConnection for MockConnection {
    fn send(&self, message: Message) -> SendFuture {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(RelayError::tcp(
                "simulated send failure",
            ))));
        }
        self.sent.lock().push(message);
        Box::pin(future::ready(Ok(())))
    }

    fn on_write_inactivity(&self, task: WatchdogTask, interval: Duration) {
        *self.write_watchdog.lock() = Some((task, interval));
    }

    fn on_read_inactivity(&self, task: WatchdogTask, interval: Duration) {
        *self.read_watchdog.lock() = Some((task, interval));
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A started relay wired to a [`MockTcpClient`] with every channel end a
/// test needs to drive or observe it.
pub struct TestRelay {
    pub relay: Arc<StompBrokerRelay>,
    pub tcp: Arc<MockTcpClient>,
    pub outbound_rx: mpsc::UnboundedReceiver<Message>,
    pub events: broadcast::Receiver<BrokerEvent>,
    pub client_tx: mpsc::UnboundedSender<Message>,
    pub broker_tx: mpsc::UnboundedSender<Message>,
}

static INIT_LOGGING: Once = Once::new();

/// Opt-in test logging: `RUST_LOG=stomp_relay=trace cargo test` shows the
/// relay's per-session diagnostics.
fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn start_relay<F>(configure: F) -> TestRelay
where
    F: FnOnce(RelayConfigBuilder) -> RelayConfigBuilder,
{
    init_logging();
    let tcp = MockTcpClient::new();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let config = configure(RelayConfig::builder().tcp_client(tcp.clone())).build();
    let relay = StompBrokerRelay::new(config, outbound_tx).unwrap();
    let events = relay.subscribe_availability();

    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let (broker_tx, broker_rx) = mpsc::unbounded_channel();
    relay.start(client_rx, broker_rx).unwrap();

    TestRelay {
        relay,
        tcp,
        outbound_rx,
        events,
        client_tx,
        broker_tx,
    }
}

/// Simulate TCP establishment and the broker's CONNECTED frame on the
/// system session (always the first connect the relay initiates). Returns
/// the system connection.
pub fn connect_system(test: &TestRelay, heartbeat: (u64, u64)) -> Arc<MockConnection> {
    let handler = test.tcp.handler(0);
    let connection = MockConnection::new();
    handler.after_connected(connection.clone());
    handler.handle_message(connected_frame(heartbeat));
    connection
}

/// Simulate TCP establishment and CONNECTED on the most recently initiated
/// connect (used for client sessions).
pub fn connect_last_session(test: &TestRelay, heartbeat: (u64, u64)) -> Arc<MockConnection> {
    let handler = test.tcp.last_handler();
    let connection = MockConnection::new();
    handler.after_connected(connection.clone());
    handler.handle_message(connected_frame(heartbeat));
    connection
}

/// Let spawned forwarding/teardown tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn connected_frame(heartbeat: (u64, u64)) -> Message {
    let mut headers = StompHeaderAccessor::for_command(StompCommand::Connected);
    headers.set_heartbeat(heartbeat.0, heartbeat.1);
    Message::empty(headers)
}

pub fn client_connect(session_id: &str) -> Message {
    let mut headers = StompHeaderAccessor::for_command(StompCommand::Connect);
    headers.set_session_id(session_id);
    headers.set_accept_version("1.1,1.2");
    headers.set_login("client-supplied");
    headers.set_passcode("client-supplied");
    Message::empty(headers)
}

pub fn client_send(session_id: &str, destination: &str, body: &str) -> Message {
    let mut headers = StompHeaderAccessor::for_command(StompCommand::Send);
    headers.set_session_id(session_id);
    headers.set_destination(destination);
    Message::new(headers, Bytes::copy_from_slice(body.as_bytes()))
}

pub fn client_disconnect(session_id: &str) -> Message {
    let mut headers = StompHeaderAccessor::for_command(StompCommand::Disconnect);
    headers.set_session_id(session_id);
    Message::empty(headers)
}

/// A server-originated send: generic simple-messaging headers, no STOMP
/// command, no session id.
pub fn app_send(destination: &str, body: &str) -> Message {
    let mut headers = StompHeaderAccessor::for_message_type(SimpMessageType::Message);
    headers.set_destination(destination);
    Message::new(headers, Bytes::copy_from_slice(body.as_bytes()))
}

pub fn broker_message(destination: &str, body: &str) -> Message {
    let mut headers = StompHeaderAccessor::for_command(StompCommand::Message);
    headers.set_destination(destination);
    Message::new(headers, Bytes::copy_from_slice(body.as_bytes()))
}
