//! Native desktop notifications.

use tracing::warn;

use sl_core::constants::APP_NAME;
use sl_core::error::{SlError, SlResult};
use sl_socket::{LogNotifier, NotificationSink, Severity};

/// Shows a native notification for every message and mirrors it to the log.
#[derive(Default)]
pub struct DesktopNotifier {
    log: LogNotifier,
}

impl DesktopNotifier {
    fn show(&self, title: &str, body: &str) -> SlResult<()> {
        notify_rust::Notification::new()
            .summary(title)
            .body(body)
            .appname(APP_NAME)
            .show()
            .map_err(|e| SlError::Notification(e.to_string()))?;
        Ok(())
    }
}

impl NotificationSink for DesktopNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        self.log.notify(title, message, severity);

        let title = match severity {
            Severity::Info => title.to_string(),
            other => format!("[{other}] {title}"),
        };
        if let Err(e) = self.show(&title, message) {
            warn!("{e}");
        }
    }
}
