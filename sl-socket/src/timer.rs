//! Tokio-backed [`Timer`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::transport::{Timer, TimerId};

/// Spawns one sleeping task per scheduled timer and reports expiry on a channel.
///
/// Must be used from within a tokio runtime.
pub struct TokioTimer {
    fired: mpsc::UnboundedSender<TimerId>,
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioTimer {
    pub fn new(fired: mpsc::UnboundedSender<TimerId>) -> Self {
        Self {
            fired,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }
}

impl Timer for TokioTimer {
    fn schedule_after(&mut self, delay: Duration) -> TimerId {
        self.tasks.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let fired = self.fired.clone();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let _ = fired.send(id);
        });
        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimer::new(tx);
        let id = timer.schedule_after(Duration::from_secs(4));

        assert_eq!(rx.recv().await, Some(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimer::new(tx);
        let cancelled = timer.schedule_after(Duration::from_secs(1));
        let kept = timer.schedule_after(Duration::from_secs(2));
        timer.cancel(cancelled);

        assert_eq!(rx.recv().await, Some(kept));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
