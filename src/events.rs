//! Broker availability lifecycle events
//!
//! The system session's STOMP connectedness drives two application-visible
//! events: `Available` when the broker acknowledges the system CONNECT, and
//! `Unavailable` on any system-session failure, close, or relay shutdown.
//! Events are published on every trigger without transition deduplication;
//! consumers must tolerate repeats.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Broker availability lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent {
    Available,
    Unavailable,
}

/// Publishes [`BrokerEvent`]s and tracks current availability for the
/// relay's dispatch gate.
#[derive(Debug, Clone)]
pub struct BrokerAvailabilityPublisher {
    events_tx: broadcast::Sender<BrokerEvent>,
    available: Arc<AtomicBool>,
}

impl BrokerAvailabilityPublisher {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity);
        Self {
            events_tx,
            available: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to availability events.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.events_tx.subscribe()
    }

    /// Whether the broker is currently reachable through the system session.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn publish_available(&self) {
        self.available.store(true, Ordering::SeqCst);
        if self.events_tx.send(BrokerEvent::Available).is_err() {
            debug!("No subscribers for broker available event");
        }
    }

    pub fn publish_unavailable(&self) {
        self.available.store(false, Ordering::SeqCst);
        if self.events_tx.send(BrokerEvent::Unavailable).is_err() {
            debug!("No subscribers for broker unavailable event");
        }
    }
}

impl Default for BrokerAvailabilityPublisher {
    fn default() -> Self {
        Self::new(16)
    }
}
