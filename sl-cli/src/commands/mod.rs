//! CLI command implementations.

pub mod config;
pub mod listen;
pub mod send;

use std::sync::Arc;

use serde_json::{Map, Value};

use sl_core::config::AppConfig;
use sl_core::error::{SlError, SlResult};
use sl_socket::{LogNotifier, NotificationSink};

use crate::notifier::DesktopNotifier;

/// Apply a `--url` override to the loaded config.
pub fn apply_url_override(config: &mut AppConfig, url: Option<String>) -> SlResult<()> {
    if let Some(url) = url {
        config.server.url = AppConfig::sanitize_server_url(&url);
    }
    if !config.is_server_configured() {
        return Err(SlError::MissingConfig(
            "server url (use --url or set server.url in the config file)".into(),
        ));
    }
    Ok(())
}

/// Pick the notification sink for this run.
pub fn notification_sink(desktop: bool) -> Arc<dyn NotificationSink> {
    if desktop {
        Arc::new(DesktopNotifier::default())
    } else {
        Arc::new(LogNotifier)
    }
}

/// Parse `key=value` pairs into envelope fields.
///
/// Values that parse as JSON keep their type (`count=3` is a number,
/// `tags=["a"]` an array); anything else is sent as a string.
pub fn parse_fields(pairs: &[String]) -> SlResult<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| SlError::Config(format!("field must be key=value, got {pair:?}")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(SlError::Config(format!("field has an empty key: {pair:?}")));
        }
        if key == "type" {
            return Err(SlError::Config("use --type to set the message type".into()));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

/// Merge configured and command-line channels, keeping first occurrence order.
pub fn merge_channels(configured: &[String], extra: Vec<String>) -> Vec<String> {
    let mut channels: Vec<String> = Vec::new();
    for channel in configured.iter().cloned().chain(extra) {
        let channel = channel.trim().to_string();
        if !channel.is_empty() && !channels.contains(&channel) {
            channels.push(channel);
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fields_types() {
        let fields = parse_fields(&[
            "scanId=s1".to_string(),
            "priority=3".to_string(),
            "force=true".to_string(),
            "targets=[\"10.0.0.1\"]".to_string(),
            "note=a=b".to_string(),
        ])
        .unwrap();

        assert_eq!(fields["scanId"], json!("s1"));
        assert_eq!(fields["priority"], json!(3));
        assert_eq!(fields["force"], json!(true));
        assert_eq!(fields["targets"], json!(["10.0.0.1"]));
        assert_eq!(fields["note"], json!("a=b"));
    }

    #[test]
    fn test_parse_fields_rejects_bad_pairs() {
        assert!(parse_fields(&["novalue".to_string()]).is_err());
        assert!(parse_fields(&["=x".to_string()]).is_err());
        assert!(parse_fields(&["type=ping".to_string()]).is_err());
    }

    #[test]
    fn test_merge_channels_dedups() {
        let merged = merge_channels(
            &["alerts".to_string(), "scan:1".to_string()],
            vec!["scan:1".to_string(), " logs ".to_string(), String::new()],
        );
        assert_eq!(merged, vec!["alerts", "scan:1", "logs"]);
    }

    #[test]
    fn test_url_override() {
        let mut config = AppConfig::default();
        assert!(apply_url_override(&mut config, None).is_err());

        apply_url_override(&mut config, Some("localhost:8080/".into())).unwrap();
        assert_eq!(config.server.url, "ws://localhost:8080");
    }
}
