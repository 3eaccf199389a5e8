//! The synchronous client core: a [`ConnectionManager`] and a
//! [`SubscriptionRouter`] wired together.
//!
//! Every method is a reaction to one event (a consumer call, a transport
//! report, a timer expiry) and runs to completion. The async driver in
//! [`crate::client`] feeds events in one at a time; tests feed them by hand.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use sl_core::config::ReconnectConfig;

use crate::events::{ConnectionState, EventProjector};
use crate::manager::{ConnectionManager, ConnectionSignal, ConnectionSnapshot};
use crate::message::SubscriptionId;
use crate::router::{ChannelHandler, SubscriptionRouter};
use crate::transport::{ConnectionId, NotificationSink, Timer, TimerId, Transport, TransportEvent};

pub struct ClientCore<T, M> {
    connection: ConnectionManager<T, M>,
    router: SubscriptionRouter,
}

impl<T: Transport, M: Timer> ClientCore<T, M> {
    pub fn new(
        transport: T,
        timer: M,
        config: ReconnectConfig,
        notifier: Arc<dyn NotificationSink>,
        projector: Box<dyn EventProjector>,
    ) -> Self {
        Self {
            connection: ConnectionManager::new(transport, timer, config, notifier.clone()),
            router: SubscriptionRouter::new(notifier, projector),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.connection.snapshot()
    }

    pub fn connection(&self) -> &ConnectionManager<T, M> {
        &self.connection
    }

    pub fn router(&self) -> &SubscriptionRouter {
        &self.router
    }

    pub fn connect(&mut self) {
        let signal = self.connection.connect();
        self.apply(signal);
    }

    pub fn resume(&mut self) {
        let signal = self.connection.resume();
        self.apply(signal);
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    pub fn subscribe(&mut self, channel: impl Into<String>, handler: ChannelHandler) -> SubscriptionId {
        self.router.subscribe(&mut self.connection, channel, handler)
    }

    /// Subscribe under an id generated by the caller.
    pub fn subscribe_with_id(
        &mut self,
        id: SubscriptionId,
        channel: String,
        handler: ChannelHandler,
    ) -> bool {
        self.router.insert(&mut self.connection, id, channel, handler)
    }

    pub fn unsubscribe(&mut self, id: &SubscriptionId) -> bool {
        self.router.unsubscribe(&mut self.connection, id)
    }

    pub fn send(&mut self, kind: &str, fields: Map<String, Value>) -> bool {
        self.router.send(&mut self.connection, kind, fields)
    }

    pub fn handle_transport_event(&mut self, conn: ConnectionId, event: TransportEvent) {
        let signal = self.connection.handle_event(conn, event);
        self.apply(signal);
    }

    pub fn handle_timer(&mut self, id: TimerId) {
        let signal = self.connection.on_timer(id);
        self.apply(signal);
    }

    fn apply(&mut self, signal: Option<ConnectionSignal>) {
        match signal {
            Some(ConnectionSignal::Opened) => {
                let replayed = self.router.on_open(&mut self.connection);
                info!(
                    "connection {} open, {replayed} subscription(s) replayed",
                    self.connection.snapshot().connection_id
                );
            }
            Some(ConnectionSignal::Message(text)) => {
                self.router.dispatch(&text);
            }
            Some(ConnectionSignal::Lost) => {
                error!(
                    "automatic recovery stopped with {} active subscription(s)",
                    self.router.len()
                );
            }
            None => {}
        }
    }
}
