//! Async driver for [`ClientCore`].
//!
//! [`RealtimeClient`] is a cheap, cloneable handle. The core itself lives in a
//! single tokio task that owns the WebSocket transport and the reconnect
//! timer. Consumer calls, transport reports and timer expiries reach that
//! task over channels and are applied one at a time, so no locking is needed
//! around connection or subscription state.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

use sl_core::config::AppConfig;
use sl_core::constants::EVENT_CHANNEL_CAPACITY;
use sl_core::error::{SlError, SlResult};

use crate::events::{ConnectionState, EventDispatcher, RealtimeEvent};
use crate::manager::ConnectionSnapshot;
use crate::message::SubscriptionId;
use crate::router::ChannelHandler;
use crate::session::ClientCore;
use crate::timer::TokioTimer;
use crate::transport::{ConnectionId, NotificationSink, TimerId, TransportEvent};
use crate::ws::WsTransport;

enum Command {
    Connect,
    Resume,
    Disconnect,
    Subscribe {
        id: SubscriptionId,
        channel: String,
        handler: ChannelHandler,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Send {
        kind: String,
        fields: Map<String, Value>,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<ConnectionSnapshot>,
    },
}

/// Handle to a running realtime client.
///
/// The driver task stops once every handle has been dropped; the connection
/// is closed normally on the way out.
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    dispatcher: EventDispatcher,
}

impl RealtimeClient {
    /// Start the driver task for `config.server.url`.
    ///
    /// The client starts `Disconnected`; call [`connect`](Self::connect) to
    /// open the connection. Must be called from within a tokio runtime.
    pub fn spawn(config: &AppConfig, notifier: Arc<dyn NotificationSink>) -> SlResult<Self> {
        config.validate()?;
        if !config.is_server_configured() {
            return Err(SlError::MissingConfig("server.url".into()));
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let dispatcher = EventDispatcher::new(EVENT_CHANNEL_CAPACITY);

        let transport = WsTransport::new(
            config.server.url.clone(),
            config.server.connect_timeout(),
            transport_tx,
        );
        let core = ClientCore::new(
            transport,
            TokioTimer::new(timer_tx),
            config.reconnect.clone(),
            notifier,
            Box::new(dispatcher.clone()),
        );

        info!("realtime client starting for {}", config.server.url);
        tokio::spawn(run_event_loop(core, commands_rx, transport_rx, timer_rx, state_tx));

        Ok(Self {
            commands: commands_tx,
            state_rx,
            dispatcher,
        })
    }

    /// Open the connection. Restarts a client that is `Closed` or `Failed`.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Reconnect after an unexpected loss without waiting for the backoff.
    /// Has no effect after [`disconnect`](Self::disconnect).
    pub fn resume(&self) {
        self.command(Command::Resume);
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Register `handler` for payloads on `channel`.
    ///
    /// Returns immediately; the subscribe envelope goes out now if connected,
    /// otherwise on the next open.
    pub fn subscribe(
        &self,
        channel: impl Into<String>,
        handler: impl FnMut(&Value) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.command(Command::Subscribe {
            id: id.clone(),
            channel: channel.into(),
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.command(Command::Unsubscribe { id: id.clone() });
    }

    /// Send a free-form envelope. Returns `false` when not connected; nothing
    /// is buffered.
    pub async fn send(&self, kind: &str, fields: Map<String, Value>) -> bool {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            kind: kind.to_string(),
            fields,
            reply,
        });
        rx.await.unwrap_or(false)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> SlResult<()> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| SlError::ClientStopped)
    }

    /// Receive typed events projected from built-in message types.
    pub fn events(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.dispatcher.subscribe()
    }

    pub fn alert_count(&self) -> u64 {
        self.dispatcher.alert_count()
    }

    pub async fn snapshot(&self) -> SlResult<ConnectionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Snapshot { reply });
        rx.await.map_err(|_| SlError::ClientStopped)
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("realtime client task has stopped, command dropped");
        }
    }
}

async fn run_event_loop(
    mut core: ClientCore<WsTransport, TokioTimer>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut transport_events: mpsc::UnboundedReceiver<(ConnectionId, TransportEvent)>,
    mut timer_fired: mpsc::UnboundedReceiver<TimerId>,
    state_tx: watch::Sender<ConnectionState>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply_command(&mut core, command),
                None => {
                    core.disconnect();
                    publish_state(&core, &state_tx);
                    break;
                }
            },
            Some((conn, event)) = transport_events.recv() => {
                core.handle_transport_event(conn, event);
            }
            Some(id) = timer_fired.recv() => {
                core.handle_timer(id);
            }
        }
        publish_state(&core, &state_tx);
    }
    info!("realtime client stopped");
}

fn apply_command(core: &mut ClientCore<WsTransport, TokioTimer>, command: Command) {
    match command {
        Command::Connect => core.connect(),
        Command::Resume => core.resume(),
        Command::Disconnect => core.disconnect(),
        Command::Subscribe { id, channel, handler } => {
            core.subscribe_with_id(id, channel, handler);
        }
        Command::Unsubscribe { id } => {
            core.unsubscribe(&id);
        }
        Command::Send { kind, fields, reply } => {
            let _ = reply.send(core.send(&kind, fields));
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(core.snapshot());
        }
    }
}

fn publish_state(core: &ClientCore<WsTransport, TokioTimer>, state_tx: &watch::Sender<ConnectionState>) {
    let state = core.state();
    state_tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LogNotifier;

    #[tokio::test]
    async fn test_spawn_requires_server_url() {
        let result = RealtimeClient::spawn(&AppConfig::default(), Arc::new(LogNotifier));
        assert!(matches!(result, Err(SlError::MissingConfig(_))));
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_policy() {
        let mut config = AppConfig::default();
        config.server.url = "ws://127.0.0.1:9".into();
        config.reconnect.max_attempts = 0;
        assert!(RealtimeClient::spawn(&config, Arc::new(LogNotifier)).is_err());
    }

    #[tokio::test]
    async fn test_idle_client_is_disconnected() {
        let mut config = AppConfig::default();
        config.server.url = "ws://127.0.0.1:9".into();
        let client = RealtimeClient::spawn(&config, Arc::new(LogNotifier)).unwrap();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.send("ping", Map::new()).await);
        let snapshot = client.snapshot().await.unwrap();
        assert_eq!(snapshot.connection_id, 0);
        assert_eq!(snapshot.reconnect_attempts, 0);
    }
}
