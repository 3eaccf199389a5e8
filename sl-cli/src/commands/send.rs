//! Send command - deliver one free-form message and disconnect.

use std::time::Duration;

use console::style;
use serde_json::json;
use tracing::warn;

use sl_core::config::AppConfig;
use sl_core::error::{SlError, SlResult};
use sl_socket::{ConnectionState, RealtimeClient};

use crate::OutputFormat;

/// Time allowed for the closing handshake after sending.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Run the send command.
pub async fn run(
    mut config: AppConfig,
    kind: String,
    fields: Vec<String>,
    url: Option<String>,
    format: OutputFormat,
) -> SlResult<()> {
    super::apply_url_override(&mut config, url)?;
    let fields = super::parse_fields(&fields)?;
    let kind = kind.trim().to_string();
    if kind.is_empty() {
        return Err(SlError::Config("message type must not be empty".into()));
    }

    let client = RealtimeClient::spawn(&config, super::notification_sink(false))?;
    client.connect();

    let connect_timeout = config.server.connect_timeout();
    tokio::time::timeout(connect_timeout, client.wait_for_state(ConnectionState::Connected))
        .await
        .map_err(|_| SlError::ConnectTimeout(connect_timeout.as_millis() as u64))??;

    let field_count = fields.len();
    let sent = client.send(&kind, fields).await;

    client.disconnect();
    if tokio::time::timeout(CLOSE_GRACE, client.wait_for_state(ConnectionState::Closed))
        .await
        .is_err()
    {
        warn!("connection did not close within {CLOSE_GRACE:?}");
    }

    match format {
        OutputFormat::Json => {
            println!("{}", json!({ "type": kind, "fields": field_count, "sent": sent }));
        }
        OutputFormat::Text => {
            if sent {
                println!("  {} Sent {kind} to {}", style("OK").green().bold(), config.server.url);
            } else {
                println!("  {} Could not send {kind}", style("FAIL").red().bold());
            }
        }
    }

    if sent {
        Ok(())
    } else {
        Err(SlError::NotConnected)
    }
}
