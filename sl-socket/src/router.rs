//! Channel subscription bookkeeping and inbound message dispatch.
//!
//! The router owns the subscription table. It sends subscribe/unsubscribe
//! envelopes through an [`Outbound`] (normally the connection manager),
//! replays every active subscription when a connection opens, and routes
//! each inbound frame either to a built-in typed handler or to the
//! subscribers of the frame's channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use sl_core::constants::MAX_NOTIFIED_SCAN_HISTORY;

use crate::events::EventProjector;
use crate::message::{
    Alert, InboundEvent, OutboundEnvelope, ScanStatus, ScanUpdate, SubscriptionId,
};
use crate::transport::NotificationSink;

/// Callback invoked with the payload of every frame on a subscribed channel.
pub type ChannelHandler = Box<dyn FnMut(&Value) + Send>;

/// Sending side as seen by the router.
pub trait Outbound {
    fn is_connected(&self) -> bool;

    /// Send a text frame. Returns `false` if nothing was sent.
    fn send_text(&mut self, text: String) -> bool;
}

/// A consumer's interest in one channel.
pub struct Subscription {
    pub id: SubscriptionId,
    pub channel: String,
    handler: ChannelHandler,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The frame could not be parsed and was discarded.
    Malformed,
    /// Handled by a built-in typed handler.
    BuiltIn(&'static str),
    /// Delivered to this many channel subscribers.
    Delivered(usize),
    /// No subscriber for the frame's channel (or no channel at all).
    Dropped,
}

pub struct SubscriptionRouter {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    /// Subscription ids per channel, in subscribe order.
    by_channel: HashMap<String, Vec<SubscriptionId>>,
    notifier: Arc<dyn NotificationSink>,
    projector: Box<dyn EventProjector>,
    /// Scans whose terminal notification has been shown.
    notified_scans: VecDeque<String>,
}

fn transmit(out: &mut dyn Outbound, envelope: &OutboundEnvelope) -> bool {
    match envelope.to_text() {
        Ok(text) => out.send_text(text),
        Err(e) => {
            warn!("failed to encode {} envelope: {e}", envelope.kind);
            false
        }
    }
}

impl SubscriptionRouter {
    pub fn new(notifier: Arc<dyn NotificationSink>, projector: Box<dyn EventProjector>) -> Self {
        Self {
            subscriptions: HashMap::new(),
            by_channel: HashMap::new(),
            notifier,
            projector,
            notified_scans: VecDeque::new(),
        }
    }

    /// Subscribe `handler` to `channel` and return the new subscription id.
    ///
    /// The subscribe envelope goes out immediately when connected, otherwise
    /// with the replay on the next open.
    pub fn subscribe(
        &mut self,
        out: &mut dyn Outbound,
        channel: impl Into<String>,
        handler: ChannelHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.insert(out, id.clone(), channel.into(), handler);
        id
    }

    /// Register a subscription under an id chosen by the caller.
    ///
    /// Returns `false` if the id is already in use.
    pub fn insert(
        &mut self,
        out: &mut dyn Outbound,
        id: SubscriptionId,
        channel: String,
        handler: ChannelHandler,
    ) -> bool {
        if self.subscriptions.contains_key(&id) {
            warn!("subscription {id} already exists, ignoring");
            return false;
        }

        if out.is_connected() {
            transmit(out, &OutboundEnvelope::subscribe(&channel, &id));
        } else {
            debug!("subscription {id} to {channel} deferred until connected");
        }

        self.by_channel
            .entry(channel.clone())
            .or_default()
            .push(id.clone());
        self.subscriptions.insert(
            id.clone(),
            Subscription {
                id,
                channel,
                handler,
            },
        );
        true
    }

    /// Remove a subscription. Unknown ids are a no-op and return `false`.
    pub fn unsubscribe(&mut self, out: &mut dyn Outbound, id: &SubscriptionId) -> bool {
        let Some(subscription) = self.subscriptions.remove(id) else {
            debug!("unsubscribe of unknown subscription {id}");
            return false;
        };

        if let Some(ids) = self.by_channel.get_mut(&subscription.channel) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.by_channel.remove(&subscription.channel);
            }
        }

        if out.is_connected() {
            transmit(out, &OutboundEnvelope::unsubscribe(&subscription.channel, id));
        }
        debug!("unsubscribed {id} from {}", subscription.channel);
        true
    }

    /// Replay every active subscription on a freshly opened connection.
    ///
    /// Returns the number of subscribe envelopes sent.
    pub fn on_open(&mut self, out: &mut dyn Outbound) -> usize {
        let mut sent = 0;
        for ids in self.by_channel.values() {
            for id in ids {
                if let Some(subscription) = self.subscriptions.get(id) {
                    if transmit(out, &OutboundEnvelope::subscribe(&subscription.channel, id)) {
                        sent += 1;
                    }
                }
            }
        }
        debug!("replayed {sent} subscription(s)");
        sent
    }

    /// Send a free-form envelope. Nothing is buffered while disconnected.
    pub fn send(&mut self, out: &mut dyn Outbound, kind: &str, fields: Map<String, Value>) -> bool {
        if !out.is_connected() {
            debug!("send of {kind} skipped: not connected");
            return false;
        }
        transmit(out, &OutboundEnvelope::custom(kind, fields))
    }

    /// Parse and route one inbound text frame. Never fails; malformed frames
    /// are logged and discarded.
    pub fn dispatch(&mut self, raw: &str) -> DispatchOutcome {
        let event = match InboundEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("discarding inbound frame: {e}");
                return DispatchOutcome::Malformed;
            }
        };

        match event {
            InboundEvent::ScanUpdate(update) => {
                self.on_scan_update(update);
                DispatchOutcome::BuiltIn("scan_update")
            }
            InboundEvent::Alert(alert) => {
                self.on_alert(alert);
                DispatchOutcome::BuiltIn("alert")
            }
            InboundEvent::SystemStatus(status) => {
                self.projector.system_status(&status);
                DispatchOutcome::BuiltIn("system_status")
            }
            InboundEvent::Progress(progress) => {
                self.projector.task_progress(&progress);
                DispatchOutcome::BuiltIn("progress")
            }
            InboundEvent::Channel {
                kind,
                channel,
                payload,
            } => self.deliver(&kind, channel.as_deref(), &payload),
        }
    }

    fn on_scan_update(&mut self, update: ScanUpdate) {
        self.projector.scan_update(&update);

        let Some(severity) = update.status.terminal_severity() else {
            // A scan that runs again after finishing may notify again.
            self.notified_scans.retain(|id| id != &update.scan_id);
            return;
        };
        if self.notified_scans.contains(&update.scan_id) {
            debug!("scan {} already reported as {}", update.scan_id, update.status);
            return;
        }
        self.notified_scans.push_back(update.scan_id.clone());
        if self.notified_scans.len() > MAX_NOTIFIED_SCAN_HISTORY {
            self.notified_scans.pop_front();
        }

        let title = if update.status == ScanStatus::Completed {
            "Scan completed"
        } else {
            "Scan failed"
        };
        let message = update
            .message
            .clone()
            .unwrap_or_else(|| format!("Scan {} {}", update.scan_id, update.status));
        self.notifier.notify(title, &message, severity);
    }

    fn on_alert(&mut self, alert: Alert) {
        self.notifier.notify(&alert.title, &alert.message, alert.severity);
        self.projector.alert_received(&alert);
    }

    fn deliver(&mut self, kind: &str, channel: Option<&str>, payload: &Value) -> DispatchOutcome {
        let Some(channel) = channel else {
            debug!("dropping {kind} frame without channel");
            return DispatchOutcome::Dropped;
        };
        let Some(ids) = self.by_channel.get(channel) else {
            debug!("no subscriber for {kind} on {channel}");
            return DispatchOutcome::Dropped;
        };

        let mut delivered = 0;
        for id in ids {
            if let Some(subscription) = self.subscriptions.get_mut(id) {
                (subscription.handler)(payload);
                delivered += 1;
            }
        }
        debug!("delivered {kind} on {channel} to {delivered} subscriber(s)");
        DispatchOutcome::Delivered(delivered)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Channels with at least one subscriber.
    pub fn channels(&self) -> Vec<&str> {
        let mut channels: Vec<&str> = self.by_channel.keys().map(String::as_str).collect();
        channels.sort_unstable();
        channels
    }
}
