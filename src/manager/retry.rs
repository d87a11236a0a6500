//! Single-shot resend timer of one stream.
//!
//! K_i: At most one timer is armed per stream; arming supersedes the
//! previous one. A timer that fires after being superseded or cancelled is
//! recognised as stale by its sequence number.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

struct ArmedTimer {
    seq: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Resend timer for the oldest unacknowledged update of a stream.
#[derive(Default)]
pub struct RetryScheduler {
    armed: Option<ArmedTimer>,
    next_seq: u64,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer to call `on_fire(seq)` after `interval`, replacing any
    /// armed timer. Must be called from within a tokio runtime.
    pub fn arm<F>(&mut self, interval: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();

        self.next_seq += 1;
        let seq = self.next_seq;
        let deadline = Instant::now() + interval;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            on_fire(seq);
        });

        self.armed = Some(ArmedTimer {
            seq,
            deadline,
            handle,
        });
        seq
    }

    /// Disarm without firing.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.armed.take() {
            timer.handle.abort();
        }
    }

    /// Consume a firing. Returns `false` if `seq` is not the armed timer.
    pub fn fired(&mut self, seq: u64) -> bool {
        match &self.armed {
            Some(timer) if timer.seq == seq => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// When the armed timer is due.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|t| t.deadline)
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut retry = RetryScheduler::new();

        let seq = retry.arm(Duration::from_secs(10), move |seq| {
            let _ = tx.send(seq);
        });
        assert!(retry.is_armed());
        assert_eq!(retry.deadline(), Some(Instant::now() + Duration::from_secs(10)));

        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(seq));
        assert!(started.elapsed() >= Duration::from_secs(10));

        assert!(retry.fired(seq));
        assert!(!retry.is_armed());
        // The spawned task finished and dropped its sender.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut retry = RetryScheduler::new();

        let tx1 = tx.clone();
        let first = retry.arm(Duration::from_secs(1), move |seq| {
            let _ = tx1.send(seq);
        });
        let second = retry.arm(Duration::from_secs(5), move |seq| {
            let _ = tx.send(seq);
        });
        assert_ne!(first, second);

        assert_eq!(rx.recv().await, Some(second));
        assert!(!retry.fired(first));
        assert!(retry.fired(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let mut retry = RetryScheduler::new();

        let seq = retry.arm(Duration::from_secs(1), move |seq| {
            let _ = tx.send(seq);
        });
        retry.cancel();
        assert!(!retry.is_armed());
        assert!(!retry.fired(seq));

        // Aborting the task drops the only sender.
        assert_eq!(rx.recv().await, None);
    }
}
