//! Collaborator contracts consumed by the connection core.
//!
//! The core never performs IO itself. It drives a [`Transport`], schedules
//! reconnects on a [`Timer`] and reports user-visible failures to a
//! [`NotificationSink`]. The outcomes of asynchronous work (transport
//! callbacks, timer expiry) are fed back into the core as events.

use std::time::Duration;

use tracing::{error, info, warn};

use sl_core::error::SlResult;

use crate::message::Severity;

/// Identifies one open attempt. Every `open` uses a fresh id so events from a
/// superseded connection can be told apart.
pub type ConnectionId = u64;

/// Something the transport reports about the connection it opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is usable.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The connection closed with the given close code.
    Closed { code: u16, reason: String },
    /// The connection failed, either while opening or while open.
    Error(String),
}

/// Bidirectional text-frame transport.
pub trait Transport {
    /// Begin opening connection `conn`. The outcome is reported later as a
    /// [`TransportEvent`] tagged with `conn`. An `Err` means the attempt could
    /// not even be started.
    fn open(&mut self, conn: ConnectionId) -> SlResult<()>;

    /// Queue a text frame on the current connection.
    fn send(&mut self, text: String) -> SlResult<()>;

    /// Close the current connection with a close code and reason.
    fn close(&mut self, code: u16, reason: &str);
}

/// Handle of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Deferred-callback facility. Expiry is reported back to the core with the
/// returned [`TimerId`].
pub trait Timer {
    fn schedule_after(&mut self, delay: Duration) -> TimerId;

    fn cancel(&mut self, id: TimerId);
}

/// Presents user-visible messages.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, message: &str, severity: Severity);
}

/// Notification sink that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Error => error!(%severity, "{title}: {message}"),
            Severity::Warning => warn!(%severity, "{title}: {message}"),
            Severity::Success | Severity::Info => info!(%severity, "{title}: {message}"),
        }
    }
}
