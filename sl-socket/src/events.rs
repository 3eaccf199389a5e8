//! Connection state, typed realtime events, and the broadcast dispatcher.
//!
//! The router hands every typed built-in message to an [`EventProjector`].
//! [`EventDispatcher`] is the projector used by the async client: it
//! republishes events on a tokio broadcast channel so any number of consumers
//! can observe them, and keeps the alert counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::message::{Alert, ScanUpdate, SystemStatus, TaskProgress};

/// Connection state of the [`ConnectionManager`](crate::manager::ConnectionManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Initial state; no connection has been attempted.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Connected and receiving events.
    Connected,
    /// Connection lost, waiting for the next backoff attempt.
    Reconnecting,
    /// Shut down by an explicit disconnect.
    Closed,
    /// Reconnection attempts exhausted, will not auto-reconnect.
    Failed,
}

impl ConnectionState {
    /// Whether automatic recovery has stopped in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Receives the typed built-in messages.
///
/// Each method stands for one presentation-side collaborator: the scan-status
/// projector keyed by scan id, the component-status projector, the
/// task-progress projector and the alert counter.
pub trait EventProjector: Send {
    fn scan_update(&self, _update: &ScanUpdate) {}

    fn system_status(&self, _status: &SystemStatus) {}

    fn task_progress(&self, _progress: &TaskProgress) {}

    /// Called once per `alert` message.
    fn alert_received(&self, _alert: &Alert) {}
}

/// A typed event as republished by the [`EventDispatcher`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RealtimeEvent {
    ScanUpdate(ScanUpdate),
    Alert(Alert),
    SystemStatus(SystemStatus),
    Progress(TaskProgress),
}

impl RealtimeEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ScanUpdate(_) => "scan_update",
            Self::Alert(_) => "alert",
            Self::SystemStatus(_) => "system_status",
            Self::Progress(_) => "progress",
        }
    }
}

/// Broadcast-based event dispatcher for decoupled event handling.
///
/// Uses tokio::broadcast channels so multiple consumers can independently
/// receive and process events without blocking each other.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<RealtimeEvent>,
    alerts: Arc<AtomicU64>,
}

impl EventDispatcher {
    /// Create a new EventDispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            alerts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to receive realtime events.
    ///
    /// Slow consumers that fall behind will receive a RecvError::Lagged
    /// and may miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    /// Dispatch an event to all active subscribers.
    pub fn dispatch(&self, event: RealtimeEvent) {
        let event_type = event.type_name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!("dispatched {event_type} to {count} subscriber(s)");
            }
            Err(_) => {
                // No active receivers -- this is fine during startup/shutdown
                debug!("no subscribers for event {event_type}");
            }
        }
    }

    /// Number of alerts received since the dispatcher was created.
    pub fn alert_count(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventProjector for EventDispatcher {
    fn scan_update(&self, update: &ScanUpdate) {
        self.dispatch(RealtimeEvent::ScanUpdate(update.clone()));
    }

    fn system_status(&self, status: &SystemStatus) {
        self.dispatch(RealtimeEvent::SystemStatus(status.clone()));
    }

    fn task_progress(&self, progress: &TaskProgress) {
        self.dispatch(RealtimeEvent::Progress(progress.clone()));
    }

    fn alert_received(&self, alert: &Alert) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
        self.dispatch(RealtimeEvent::Alert(alert.clone()));
    }
}
