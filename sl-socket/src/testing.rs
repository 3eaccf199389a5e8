//! Recording fakes for the collaborator traits, shared by unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sl_core::error::{SlError, SlResult};

use crate::message::Severity;
use crate::transport::{ConnectionId, NotificationSink, Timer, TimerId, Transport};

#[derive(Default)]
struct TransportLog {
    opened: Vec<ConnectionId>,
    sent: Vec<String>,
    closed: Vec<u16>,
    fail_next_open: bool,
}

/// Transport that records every call. Clones share the same log.
#[derive(Clone, Default)]
pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl FakeTransport {
    pub fn opened(&self) -> Vec<ConnectionId> {
        self.log.lock().unwrap().opened.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.log.lock().unwrap().sent.clear();
    }

    pub fn closed(&self) -> Vec<u16> {
        self.log.lock().unwrap().closed.clone()
    }

    pub fn fail_next_open(&self) {
        self.log.lock().unwrap().fail_next_open = true;
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, conn: ConnectionId) -> SlResult<()> {
        let mut log = self.log.lock().unwrap();
        log.opened.push(conn);
        if std::mem::take(&mut log.fail_next_open) {
            return Err(SlError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn send(&mut self, text: String) -> SlResult<()> {
        self.log.lock().unwrap().sent.push(text);
        Ok(())
    }

    fn close(&mut self, code: u16, _reason: &str) {
        self.log.lock().unwrap().closed.push(code);
    }
}

#[derive(Default)]
struct TimerLog {
    next_id: u64,
    scheduled: Vec<(TimerId, Duration)>,
    cancelled: Vec<TimerId>,
}

/// Timer that never fires on its own; tests fire ids by hand.
#[derive(Clone, Default)]
pub struct FakeTimer {
    log: Arc<Mutex<TimerLog>>,
}

impl FakeTimer {
    pub fn scheduled(&self) -> Vec<(TimerId, Duration)> {
        self.log.lock().unwrap().scheduled.clone()
    }

    pub fn last_scheduled(&self) -> Option<(TimerId, Duration)> {
        self.log.lock().unwrap().scheduled.last().copied()
    }

    pub fn cancelled(&self) -> Vec<TimerId> {
        self.log.lock().unwrap().cancelled.clone()
    }
}

impl Timer for FakeTimer {
    fn schedule_after(&mut self, delay: Duration) -> TimerId {
        let mut log = self.log.lock().unwrap();
        log.next_id += 1;
        let id = TimerId(log.next_id);
        log.scheduled.push((id, delay));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.log.lock().unwrap().cancelled.push(id);
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
