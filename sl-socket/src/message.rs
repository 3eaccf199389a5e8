//! Wire message types.
//!
//! Inbound frames are JSON objects of the shape
//! `{"type": string, "channel"?: string, "payload": object}`. The four
//! built-in types carry typed payloads; anything else is routed by channel.
//! Outbound frames are subscribe/unsubscribe control envelopes or free-form
//! `{"type": string, ...fields}` objects.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use sl_core::constants::message_types;
use sl_core::error::{SlError, SlResult};

/// Severity passed to the notification sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    #[default]
    Info,
}

impl Severity {
    /// Parse a severity string from the server. Unrecognised values map to `Info`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "error" => Self::Error,
            "warning" | "warn" => Self::Warning,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn lenient_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(Severity::parse).unwrap_or_default())
}

/// Lifecycle status of a scan as reported in `scan_update` payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Any status this client does not know about.
    Unknown(String),
}

impl ScanStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" | "queued" => Self::Pending,
            "running" | "in_progress" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Notification severity for statuses that end a scan and should be
    /// surfaced to the user; `None` for everything else.
    pub fn terminal_severity(&self) -> Option<Severity> {
        match self {
            Self::Completed => Some(Severity::Success),
            Self::Failed => Some(Severity::Error),
            _ => None,
        }
    }
}

impl From<String> for ScanStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

impl From<ScanStatus> for String {
    fn from(status: ScanStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `scan_update` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanUpdate {
    pub scan_id: String,
    pub status: ScanStatus,
    /// Percentage complete, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of an `alert` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    #[serde(default, deserialize_with = "lenient_severity")]
    pub severity: Severity,
    /// Timestamp as sent by the server (ISO-8601 string or epoch number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

/// Payload of a `system_status` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub component: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of a `progress` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub task_id: String,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Message type tag of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ScanUpdate,
    Alert,
    SystemStatus,
    Progress,
    /// Application-defined type, routed by channel.
    Other(String),
}

impl MessageKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            message_types::SCAN_UPDATE => Self::ScanUpdate,
            message_types::ALERT => Self::Alert,
            message_types::SYSTEM_STATUS => Self::SystemStatus,
            message_types::PROGRESS => Self::Progress,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ScanUpdate => message_types::SCAN_UPDATE,
            Self::Alert => message_types::ALERT,
            Self::SystemStatus => message_types::SYSTEM_STATUS,
            Self::Progress => message_types::PROGRESS,
            Self::Other(s) => s.as_str(),
        }
    }
}

/// A parsed inbound frame, before payload typing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl InboundMessage {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> SlResult<Self> {
        serde_json::from_str(raw).map_err(|e| SlError::MalformedFrame(e.to_string()))
    }
}

/// An inbound frame with its payload decoded according to its type.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ScanUpdate(ScanUpdate),
    Alert(Alert),
    SystemStatus(SystemStatus),
    Progress(TaskProgress),
    /// Not a built-in type; delivered to the subscribers of `channel`.
    Channel {
        kind: String,
        channel: Option<String>,
        payload: Value,
    },
}

impl InboundEvent {
    /// Parse and type a raw text frame.
    pub fn parse(raw: &str) -> SlResult<Self> {
        Self::try_from(InboundMessage::parse(raw)?)
    }
}

fn typed_payload<T: serde::de::DeserializeOwned>(kind: &str, payload: Value) -> SlResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| SlError::MalformedFrame(format!("invalid {kind} payload: {e}")))
}

impl TryFrom<InboundMessage> for InboundEvent {
    type Error = SlError;

    fn try_from(message: InboundMessage) -> SlResult<Self> {
        let kind = MessageKind::from_str(&message.kind);
        let event = match kind {
            MessageKind::ScanUpdate => {
                Self::ScanUpdate(typed_payload(kind.as_str(), message.payload)?)
            }
            MessageKind::Alert => Self::Alert(typed_payload(kind.as_str(), message.payload)?),
            MessageKind::SystemStatus => {
                Self::SystemStatus(typed_payload(kind.as_str(), message.payload)?)
            }
            MessageKind::Progress => {
                Self::Progress(typed_payload(kind.as_str(), message.payload)?)
            }
            MessageKind::Other(kind) => Self::Channel {
                kind,
                channel: message.channel,
                payload: message.payload,
            },
        };
        Ok(event)
    }
}

/// Opaque subscription token, unique per `subscribe` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OutboundEnvelope {
    pub fn subscribe(channel: &str, id: &SubscriptionId) -> Self {
        Self::control(message_types::SUBSCRIBE, channel, id)
    }

    pub fn unsubscribe(channel: &str, id: &SubscriptionId) -> Self {
        Self::control(message_types::UNSUBSCRIBE, channel, id)
    }

    fn control(kind: &str, channel: &str, id: &SubscriptionId) -> Self {
        Self {
            kind: kind.to_string(),
            channel: Some(channel.to_string()),
            id: Some(id.to_string()),
            fields: Map::new(),
        }
    }

    /// A free-form envelope. A `type` key inside `fields` is ignored in favour of `kind`.
    pub fn custom(kind: &str, mut fields: Map<String, Value>) -> Self {
        fields.remove("type");
        Self {
            kind: kind.to_string(),
            channel: None,
            id: None,
            fields,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_text(&self) -> SlResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scan_update() {
        let event = InboundEvent::parse(
            r#"{"type":"scan_update","payload":{"scanId":"s1","status":"completed","progress":100}}"#,
        )
        .unwrap();
        match event {
            InboundEvent::ScanUpdate(update) => {
                assert_eq!(update.scan_id, "s1");
                assert_eq!(update.status, ScanStatus::Completed);
                assert_eq!(update.progress, Some(100.0));
                assert!(update.message.is_none());
            }
            other => panic!("expected scan update, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_alert_with_unknown_severity() {
        let event = InboundEvent::parse(
            r#"{"type":"alert","payload":{"title":"Malware","message":"Trojan found","severity":"critical","timestamp":"2024-05-01T10:00:00Z"}}"#,
        )
        .unwrap();
        let InboundEvent::Alert(alert) = event else {
            panic!("expected alert");
        };
        assert_eq!(alert.severity, Severity::Info);
        assert_eq!(alert.timestamp, Some(json!("2024-05-01T10:00:00Z")));
    }

    #[test]
    fn test_parse_progress_and_system_status() {
        let progress = InboundEvent::parse(
            r#"{"type":"progress","payload":{"taskId":"t9","progress":42.5,"message":"hashing"}}"#,
        )
        .unwrap();
        assert_eq!(
            progress,
            InboundEvent::Progress(TaskProgress {
                task_id: "t9".into(),
                progress: 42.5,
                message: Some("hashing".into()),
            })
        );

        let status = InboundEvent::parse(
            r#"{"type":"system_status","payload":{"component":"worker","status":"degraded"}}"#,
        )
        .unwrap();
        assert!(matches!(status, InboundEvent::SystemStatus(s) if s.component == "worker"));
    }

    #[test]
    fn test_unknown_type_is_channel_event() {
        let event =
            InboundEvent::parse(r#"{"type":"custom_event","channel":"scan:42","payload":{"x":1}}"#)
                .unwrap();
        assert_eq!(
            event,
            InboundEvent::Channel {
                kind: "custom_event".into(),
                channel: Some("scan:42".into()),
                payload: json!({"x": 1}),
            }
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(InboundEvent::parse("{\"type\":"), Err(SlError::MalformedFrame(_))));
        assert!(matches!(InboundEvent::parse("[1,2,3]"), Err(SlError::MalformedFrame(_))));
        assert!(matches!(
            InboundEvent::parse(r#"{"payload":{}}"#),
            Err(SlError::MalformedFrame(_))
        ));
        // Built-in type with the wrong payload shape.
        assert!(matches!(
            InboundEvent::parse(r#"{"type":"scan_update","payload":{"status":"running"}}"#),
            Err(SlError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_scan_status_terminal_severity() {
        assert_eq!(ScanStatus::Completed.terminal_severity(), Some(Severity::Success));
        assert_eq!(ScanStatus::Failed.terminal_severity(), Some(Severity::Error));
        assert_eq!(ScanStatus::Running.terminal_severity(), None);
        assert_eq!(ScanStatus::from_str("archived"), ScanStatus::Unknown("archived".into()));
    }

    #[test]
    fn test_control_envelope_shape() {
        let id = SubscriptionId::from("sub-1".to_string());
        let text = OutboundEnvelope::subscribe("scan:42", &id).to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "subscribe", "channel": "scan:42", "id": "sub-1"}));

        let text = OutboundEnvelope::unsubscribe("scan:42", &id).to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "unsubscribe");
    }

    #[test]
    fn test_custom_envelope_keeps_its_type() {
        let mut fields = Map::new();
        fields.insert("type".into(), json!("spoofed"));
        fields.insert("scanId".into(), json!("s1"));
        let text = OutboundEnvelope::custom("cancel_scan", fields).to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "cancel_scan", "scanId": "s1"}));
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        assert_ne!(SubscriptionId::generate(), SubscriptionId::generate());
    }
}
