//! Listen command - stay connected and print events as they arrive.

use std::time::Duration;

use console::style;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use sl_core::config::AppConfig;
use sl_core::error::{SlError, SlResult};
use sl_socket::{ConnectionState, RealtimeClient, RealtimeEvent};

use crate::OutputFormat;

/// How long to wait for the closing handshake on Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Run the listen command.
pub async fn run(
    mut config: AppConfig,
    url: Option<String>,
    channels: Vec<String>,
    desktop: bool,
    format: OutputFormat,
) -> SlResult<()> {
    super::apply_url_override(&mut config, url)?;
    let channels = super::merge_channels(&config.subscriptions.channels, channels);
    let notifier = super::notification_sink(desktop || config.notifications.desktop);

    let client = RealtimeClient::spawn(&config, notifier)?;
    let mut events = client.events();
    let mut state_rx = client.state_receiver();

    for channel in &channels {
        let name = channel.clone();
        client.subscribe(channel.as_str(), move |payload: &Value| {
            print_channel_payload(&name, payload, format);
        });
    }

    if format == OutputFormat::Text {
        println!(
            "{} Connecting to {}...",
            style("[scanlink]").bold().dim(),
            config.server.url
        );
        if !channels.is_empty() {
            println!("  Channels: {}", channels.join(", "));
        }
    }
    client.connect();

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                print_state(state, format);
                if state == ConnectionState::Failed {
                    error!("giving up on {}", config.server.url);
                    return Err(SlError::Transport("reconnection attempts exhausted".into()));
                }
                if state == ConnectionState::Disconnected {
                    info!("server ended the session");
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => print_event(&event, format),
                    Err(RecvError::Lagged(n)) => {
                        println!("  {} Missed {n} events (slow consumer)", style("WARN").yellow());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if format == OutputFormat::Text {
                    println!("\n  Disconnecting...");
                }
                client.disconnect();
                let _ = tokio::time::timeout(
                    SHUTDOWN_GRACE,
                    client.wait_for_state(ConnectionState::Closed),
                )
                .await;
                break;
            }
        }
    }

    info!("listen finished, {} alert(s) received", client.alert_count());
    Ok(())
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn print_state(state: ConnectionState, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", json!({ "kind": "state", "state": state }));
        }
        OutputFormat::Text => {
            let label = match state {
                ConnectionState::Connected => style(state.to_string()).green().bold(),
                ConnectionState::Reconnecting | ConnectionState::Connecting => {
                    style(state.to_string()).yellow()
                }
                ConnectionState::Failed => style(state.to_string()).red().bold(),
                _ => style(state.to_string()).dim(),
            };
            println!("  {} {} {label}", style(timestamp()).dim(), style("[state]").bold());
        }
    }
}

fn print_event(event: &RealtimeEvent, format: OutputFormat) {
    if format == OutputFormat::Json {
        let mut value = serde_json::to_value(event).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.insert("kind".into(), json!("event"));
        }
        println!("{value}");
        return;
    }

    let tag = style(format!("[{}]", event.type_name())).cyan();
    let line = match event {
        RealtimeEvent::ScanUpdate(update) => {
            let progress = update
                .progress
                .map(|p| format!(" {p:.0}%"))
                .unwrap_or_default();
            let message = update.message.as_deref().unwrap_or("");
            format!("{} {}{progress} {message}", update.scan_id, update.status)
        }
        RealtimeEvent::Alert(alert) => {
            format!("{} ({}) {}", alert.title, alert.severity, alert.message)
        }
        RealtimeEvent::SystemStatus(status) => {
            let message = status.message.as_deref().unwrap_or("");
            format!("{} {} {message}", status.component, status.status)
        }
        RealtimeEvent::Progress(progress) => {
            let message = progress.message.as_deref().unwrap_or("");
            format!("{} {:.0}% {message}", progress.task_id, progress.progress)
        }
    };
    println!("  {} {tag} {}", style(timestamp()).dim(), line.trim_end());
}

fn print_channel_payload(channel: &str, payload: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", json!({ "kind": "channel", "channel": channel, "payload": payload }));
        }
        OutputFormat::Text => {
            println!(
                "  {} {} {payload}",
                style(timestamp()).dim(),
                style(format!("<{channel}>")).magenta()
            );
        }
    }
}
