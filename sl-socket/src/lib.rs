//! ScanLink Socket - realtime WebSocket client for scan and alert events.
//!
//! This crate provides the client subsystem that handles:
//! - A single multiplexed WebSocket connection with a small state machine
//! - Automatic reconnection with exponential backoff, optional jitter and an attempt cap
//! - Channel subscriptions that survive disconnects and are replayed on every open
//! - Dispatch of built-in message types (scan updates, alerts, status, progress)
//! - Event broadcasting via tokio broadcast channels
//!
//! The state machine and router are synchronous and talk to the network and
//! clock only through the [`Transport`] and [`Timer`] traits. [`RealtimeClient`]
//! drives them from a tokio task with a tokio-tungstenite transport.

pub mod client;
pub mod events;
pub mod manager;
pub mod message;
pub mod router;
pub mod session;
pub mod timer;
pub mod transport;
pub mod ws;

#[cfg(test)]
mod testing;

// Re-export key types
pub use client::RealtimeClient;
pub use session::ClientCore;
pub use events::{ConnectionState, EventDispatcher, EventProjector, RealtimeEvent};
pub use manager::{ConnectionManager, ConnectionSignal, ConnectionSnapshot};
pub use message::{
    Alert, InboundEvent, InboundMessage, MessageKind, OutboundEnvelope, ScanStatus, ScanUpdate,
    Severity, SubscriptionId, SystemStatus, TaskProgress,
};
pub use router::{ChannelHandler, DispatchOutcome, Outbound, SubscriptionRouter};
pub use timer::TokioTimer;
pub use transport::{
    ConnectionId, LogNotifier, NotificationSink, Timer, TimerId, Transport, TransportEvent,
};
pub use ws::WsTransport;
