//! WebSocket [`Transport`] over tokio-tungstenite.
//!
//! Each `open` spawns a connection task that performs the handshake, then
//! forwards inbound text frames and writes queued outbound frames until the
//! socket closes. Everything the task observes is reported as a
//! [`TransportEvent`] tagged with the connection id it was opened with.

use std::borrow::Cow;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use sl_core::constants::close_code;
use sl_core::error::{SlError, SlResult};

use crate::transport::{ConnectionId, Transport, TransportEvent};

/// Close code reported when the peer sent a close frame without a status.
const NO_STATUS: u16 = 1005;

/// Sender half used by connection tasks to report back to the client.
pub type TransportEventSender = mpsc::UnboundedSender<(ConnectionId, TransportEvent)>;

pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
    events: TransportEventSender,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, connect_timeout: Duration, events: TransportEventSender) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            events,
            outbound: None,
            task: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    fn open(&mut self, conn: ConnectionId) -> SlResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SlError::Transport(format!("no async runtime: {e}")))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);
        self.task = Some(runtime.spawn(run_connection(
            self.url.clone(),
            self.connect_timeout,
            conn,
            outbound_rx,
            self.events.clone(),
        )));
        Ok(())
    }

    fn send(&mut self, text: String) -> SlResult<()> {
        let outbound = self.outbound.as_ref().ok_or(SlError::NotConnected)?;
        outbound
            .send(Message::Text(text))
            .map_err(|_| SlError::Transport("connection task has stopped".into()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        // Dropping the sender after the close frame lets the task finish the
        // closing handshake on its own.
        if let Some(outbound) = self.outbound.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: Cow::Owned(reason.to_string()),
            };
            let _ = outbound.send(Message::Close(Some(frame)));
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        // A closed connection is left to finish its closing handshake.
        if self.outbound.is_some() {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}

async fn run_connection(
    url: String,
    connect_timeout: Duration,
    conn: ConnectionId,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: TransportEventSender,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send((conn, event));
    };

    let stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, response))) => {
            info!(
                status = response.status().as_u16(),
                "websocket connection {conn} established to {url}"
            );
            stream
        }
        Ok(Err(e)) => {
            emit(TransportEvent::Error(format!("connect to {url} failed: {e}")));
            return;
        }
        Err(_) => {
            let err = SlError::ConnectTimeout(connect_timeout.as_millis() as u64);
            emit(TransportEvent::Error(err.to_string()));
            return;
        }
    };

    emit(TransportEvent::Opened);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => emit(TransportEvent::Message(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => emit(TransportEvent::Message(text)),
                    Err(_) => debug!("dropping non-utf8 binary frame on connection {conn}"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((NO_STATUS, String::new()));
                    emit(TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    emit(TransportEvent::Closed {
                        code: close_code::ABNORMAL,
                        reason: "stream ended".into(),
                    });
                    return;
                }
            },
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        emit(TransportEvent::Error(format!("write failed: {e}")));
                        return;
                    }
                }
                None => {
                    // Owner went away or sent its close frame; stop writing
                    // and wait for the peer to finish the handshake.
                    let _ = write.flush().await;
                    drain_until_closed(&mut read).await;
                    return;
                }
            },
        }
    }
}

async fn drain_until_closed<S>(read: &mut S)
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let drain = async {
        while let Some(Ok(frame)) = read.next().await {
            if let Message::Close(_) = frame {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(5), drain).await;
}
