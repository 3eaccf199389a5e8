//! Connection lifecycle manager.
//!
//! Owns the single transport connection and drives the state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting ...
//!                                         \-> Closed (explicit disconnect)
//!                          Reconnecting  --> Failed (attempts exhausted)
//! ```
//!
//! Reconnects use exponential backoff: the delay before attempt `k` is
//! `min(base * 2^(k-1), max)`, optionally with jitter. The manager knows
//! nothing about channels; it reports [`ConnectionSignal`]s to its owner.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use sl_core::config::ReconnectConfig;
use sl_core::constants::close_code;

use crate::events::ConnectionState;
use crate::message::Severity;
use crate::router::Outbound;
use crate::transport::{
    ConnectionId, NotificationSink, Timer, TimerId, Transport, TransportEvent,
};

/// What the owner of the manager has to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSignal {
    /// The connection became usable; subscriptions must be replayed.
    Opened,
    /// A text frame arrived on the live connection.
    Message(String),
    /// Reconnection attempts are exhausted; automatic recovery stopped.
    Lost,
}

/// Point-in-time view of the connection counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub backoff_delay: Duration,
    pub connection_id: ConnectionId,
}

/// Connection state machine over a [`Transport`] and a [`Timer`].
pub struct ConnectionManager<T, M> {
    transport: T,
    timer: M,
    config: ReconnectConfig,
    notifier: Arc<dyn NotificationSink>,
    state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    reconnect_attempts: u32,
    /// Delay used for the most recently scheduled reconnect.
    backoff_delay: Duration,
    /// Id of the most recent open attempt.
    connection_id: ConnectionId,
    pending_reconnect: Option<TimerId>,
}

impl<T: Transport, M: Timer> ConnectionManager<T, M> {
    pub fn new(
        transport: T,
        timer: M,
        config: ReconnectConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let backoff_delay = config.base_delay();
        Self {
            transport,
            timer,
            config,
            notifier,
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            backoff_delay,
            connection_id: 0,
            pending_reconnect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn backoff_delay(&self) -> Duration {
        self.backoff_delay
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            reconnect_attempts: self.reconnect_attempts,
            backoff_delay: self.backoff_delay,
            connection_id: self.connection_id,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether a reconnect timer is armed.
    pub fn has_pending_reconnect(&self) -> bool {
        self.pending_reconnect.is_some()
    }

    fn set_state(&mut self, new_state: ConnectionState) {
        if self.state != new_state {
            info!("connection state: {} -> {}", self.state, new_state);
            self.state = new_state;
        }
    }

    /// Open the transport.
    ///
    /// No-op while connecting or connected. From `Failed` or `Closed` this is
    /// an explicit restart and resets the attempt counter. From
    /// `Reconnecting` it pre-empts the pending backoff timer.
    pub fn connect(&mut self) -> Option<ConnectionSignal> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!("already connected or connecting, skipping");
                return None;
            }
            ConnectionState::Failed | ConnectionState::Closed => {
                self.reconnect_attempts = 0;
                self.backoff_delay = self.config.base_delay();
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
        }
        self.cancel_pending_reconnect();
        self.open_transport()
    }

    /// Resume hook for the host becoming active again.
    ///
    /// Reconnects immediately unless connecting, connected, or explicitly
    /// closed. Whichever of this and the backoff timer fires first wins.
    pub fn resume(&mut self) -> Option<ConnectionSignal> {
        if self.state == ConnectionState::Closed {
            debug!("resume ignored: connection was closed explicitly");
            return None;
        }
        self.connect()
    }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&mut self) {
        if self.state.is_terminal() {
            debug!("disconnect ignored in state {}", self.state);
            return;
        }
        self.cancel_pending_reconnect();
        let transport_open = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        );
        self.set_state(ConnectionState::Closed);
        if transport_open {
            self.transport.close(close_code::NORMAL, "client disconnect");
        }
        info!("connection closed by client");
    }

    /// React to an expired timer.
    pub fn on_timer(&mut self, id: TimerId) -> Option<ConnectionSignal> {
        if self.pending_reconnect != Some(id) {
            debug!("ignoring stale timer {id:?}");
            return None;
        }
        self.pending_reconnect = None;
        if self.state != ConnectionState::Reconnecting {
            return None;
        }
        info!(
            "reconnection attempt {}/{} starting",
            self.reconnect_attempts, self.config.max_attempts
        );
        self.open_transport()
    }

    /// React to something the transport reported about connection `conn`.
    pub fn handle_event(
        &mut self,
        conn: ConnectionId,
        event: TransportEvent,
    ) -> Option<ConnectionSignal> {
        if conn != self.connection_id {
            debug!("ignoring event from superseded connection {conn}");
            return None;
        }

        match event {
            TransportEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    debug!("open reported in state {}, ignoring", self.state);
                    return None;
                }
                if self.reconnect_attempts > 0 {
                    info!("reconnected after {} attempt(s)", self.reconnect_attempts);
                }
                self.reconnect_attempts = 0;
                self.backoff_delay = self.config.base_delay();
                self.set_state(ConnectionState::Connected);
                Some(ConnectionSignal::Opened)
            }
            TransportEvent::Message(text) => {
                if self.state == ConnectionState::Connected {
                    Some(ConnectionSignal::Message(text))
                } else {
                    debug!("dropping frame received in state {}", self.state);
                    None
                }
            }
            TransportEvent::Closed { code, reason } => {
                if !self.is_live() {
                    return None;
                }
                if code == close_code::NORMAL {
                    // Only our own disconnect() ends in Closed; a server-side
                    // shutdown stays resumable.
                    info!("server closed the connection normally: {reason}");
                    self.set_state(ConnectionState::Disconnected);
                    return None;
                }
                self.handle_connection_loss(code, &reason)
            }
            TransportEvent::Error(err) => {
                if !self.is_live() {
                    return None;
                }
                self.handle_connection_loss(close_code::ABNORMAL, &err)
            }
        }
    }

    /// Reconnection delay before attempt `attempt` (1-based).
    ///
    /// Sequence with the defaults: 1s, 2s, 4s, 8s, 16s, capped at 30s.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let delay = self
            .config
            .base_delay()
            .saturating_mul(factor)
            .min(self.config.max_delay());

        if self.config.jitter_factor <= 0.0 {
            return delay;
        }
        let secs = delay.as_secs_f64();
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * secs * self.config.jitter_factor;
        Duration::from_secs_f64((secs + jitter).max(0.0))
    }

    fn is_live(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    fn open_transport(&mut self) -> Option<ConnectionSignal> {
        self.connection_id += 1;
        self.set_state(ConnectionState::Connecting);
        match self.transport.open(self.connection_id) {
            Ok(()) => None,
            Err(e) => {
                warn!("failed to start connection {}: {e}", self.connection_id);
                self.handle_connection_loss(close_code::ABNORMAL, &e.to_string())
            }
        }
    }

    fn handle_connection_loss(&mut self, code: u16, reason: &str) -> Option<ConnectionSignal> {
        self.reconnect_attempts += 1;

        if self.reconnect_attempts > self.config.max_attempts {
            error!(
                "max reconnection attempts ({}) reached, giving up",
                self.config.max_attempts
            );
            self.set_state(ConnectionState::Failed);
            self.notifier.notify(
                "Connection lost",
                &format!(
                    "Could not reconnect to the server after {} attempts. Reconnect to resume live updates.",
                    self.config.max_attempts
                ),
                Severity::Error,
            );
            return Some(ConnectionSignal::Lost);
        }

        let delay = self.reconnect_delay(self.reconnect_attempts);
        self.backoff_delay = delay;
        self.set_state(ConnectionState::Reconnecting);
        warn!(
            "connection lost (code {code}: {reason}), reconnection attempt {} in {:.1}s",
            self.reconnect_attempts,
            delay.as_secs_f64()
        );
        self.pending_reconnect = Some(self.timer.schedule_after(delay));
        None
    }

    fn cancel_pending_reconnect(&mut self) {
        if let Some(id) = self.pending_reconnect.take() {
            debug!("cancelling pending reconnect {id:?}");
            self.timer.cancel(id);
        }
    }
}

impl<T: Transport, M: Timer> Outbound for ConnectionManager<T, M> {
    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn send_text(&mut self, text: String) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.transport.send(text) {
            Ok(()) => true,
            Err(e) => {
                warn!("send failed: {e}");
                false
            }
        }
    }
}
