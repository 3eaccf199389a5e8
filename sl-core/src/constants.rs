//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "ScanLink";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// WebSocket close codes used by the client.
pub mod close_code {
    /// Normal closure, sent by an explicit disconnect.
    pub const NORMAL: u16 = 1000;
    /// Reported when the connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;
}

/// Maximum number of scan ids remembered for terminal-notification de-duplication.
pub const MAX_NOTIFIED_SCAN_HISTORY: usize = 100;

/// Capacity of the typed event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Built-in inbound message type tags.
pub mod message_types {
    pub const SCAN_UPDATE: &str = "scan_update";
    pub const ALERT: &str = "alert";
    pub const SYSTEM_STATUS: &str = "system_status";
    pub const PROGRESS: &str = "progress";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
}
