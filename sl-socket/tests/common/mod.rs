//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use sl_core::config::AppConfig;
use sl_core::error::{SlError, SlResult};
use sl_socket::{ConnectionId, NotificationSink, Severity, Timer, TimerId, Transport};

/// Upper bound for any single wait in async tests.
pub const WAIT: Duration = Duration::from_secs(5);

// ---- Collaborator fakes ----

#[derive(Default)]
struct TransportLog {
    opened: Vec<ConnectionId>,
    sent: Vec<String>,
    closed: Vec<u16>,
}

/// Transport that records every call. Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl RecordingTransport {
    pub fn opened(&self) -> Vec<ConnectionId> {
        self.log.lock().unwrap().opened.clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.log
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|text| serde_json::from_str(text).expect("client sent invalid json"))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.log.lock().unwrap().sent.clear();
    }

    pub fn closed(&self) -> Vec<u16> {
        self.log.lock().unwrap().closed.clone()
    }
}

impl Transport for RecordingTransport {
    fn open(&mut self, conn: ConnectionId) -> SlResult<()> {
        self.log.lock().unwrap().opened.push(conn);
        Ok(())
    }

    fn send(&mut self, text: String) -> SlResult<()> {
        let mut log = self.log.lock().unwrap();
        if log.opened.is_empty() {
            return Err(SlError::NotConnected);
        }
        log.sent.push(text);
        Ok(())
    }

    fn close(&mut self, code: u16, _reason: &str) {
        self.log.lock().unwrap().closed.push(code);
    }
}

/// Timer fired by hand from the test.
#[derive(Clone, Default)]
pub struct ManualTimer {
    scheduled: Arc<Mutex<Vec<(TimerId, Duration)>>>,
    cancelled: Arc<Mutex<Vec<TimerId>>>,
}

impl ManualTimer {
    pub fn delays(&self) -> Vec<Duration> {
        self.scheduled.lock().unwrap().iter().map(|(_, d)| *d).collect()
    }

    pub fn last(&self) -> TimerId {
        self.scheduled.lock().unwrap().last().expect("no timer scheduled").0
    }

    pub fn cancelled(&self) -> Vec<TimerId> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl Timer for ManualTimer {
    fn schedule_after(&mut self, delay: Duration) -> TimerId {
        let mut scheduled = self.scheduled.lock().unwrap();
        let id = TimerId(scheduled.len() as u64 + 1);
        scheduled.push((id, delay));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.cancelled.lock().unwrap().push(id);
    }
}

/// Notification sink that records `(title, message, severity)`.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, String, Severity)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(String, String, Severity)> {
        self.calls.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        self.calls
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string(), severity));
    }
}

// ---- Configuration ----

/// Config pointing at `url` with a fast reconnect policy.
pub fn create_test_config(url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.url = url.to_string();
    config.server.connect_timeout_ms = 2_000;
    config.reconnect.base_delay_ms = 20;
    config.reconnect.max_delay_ms = 100;
    config.reconnect.max_attempts = 3;
    config
}

/// A `ws://` url on a port nothing listens on.
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}")
}

// ---- Local WebSocket server ----

/// What a server-side connection observed from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Json(Value),
    Closed(Option<u16>),
}

enum ServerAction {
    Text(String),
    Close(u16),
    Drop,
}

/// One accepted client connection.
pub struct ServerConn {
    frames: mpsc::UnboundedReceiver<ServerFrame>,
    actions: mpsc::UnboundedSender<ServerAction>,
}

impl ServerConn {
    /// Next frame from the client, panicking after [`WAIT`].
    pub async fn next_frame(&mut self) -> ServerFrame {
        tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server connection ended")
    }

    pub async fn next_json(&mut self) -> Value {
        match self.next_frame().await {
            ServerFrame::Json(value) => value,
            other => panic!("expected json frame, got {other:?}"),
        }
    }

    pub fn send_json(&self, value: Value) {
        let _ = self.actions.send(ServerAction::Text(value.to_string()));
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.actions.send(ServerAction::Text(text.to_string()));
    }

    /// Close with a proper close frame.
    pub fn close(&self, code: u16) {
        let _ = self.actions.send(ServerAction::Close(code));
    }

    /// Drop the TCP stream without a closing handshake.
    pub fn drop_connection(&self) {
        let _ = self.actions.send(ServerAction::Drop);
    }
}

/// WebSocket server on an ephemeral local port.
pub struct TestServer {
    pub url: String,
    connections: mpsc::UnboundedReceiver<ServerConn>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (frame_tx, frame_rx) = mpsc::unbounded_channel();
                let (action_tx, action_rx) = mpsc::unbounded_channel();
                tokio::spawn(serve_connection(ws, frame_tx, action_rx));
                if conn_tx
                    .send(ServerConn {
                        frames: frame_rx,
                        actions: action_tx,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            url,
            connections: conn_rx,
        }
    }

    /// Next accepted connection, panicking after [`WAIT`].
    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for client connection")
            .expect("server stopped")
    }
}

async fn serve_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    frames: mpsc::UnboundedSender<ServerFrame>,
    mut actions: mpsc::UnboundedReceiver<ServerAction>,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
                    let _ = frames.send(ServerFrame::Json(value));
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = frames.send(ServerFrame::Closed(frame.map(|f| u16::from(f.code))));
                    let _ = write.close().await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => {
                    let _ = frames.send(ServerFrame::Closed(None));
                    return;
                }
            },
            action = actions.recv() => match action {
                Some(ServerAction::Text(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                Some(ServerAction::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "server closing".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                }
                Some(ServerAction::Drop) | None => return,
            },
        }
    }
}
