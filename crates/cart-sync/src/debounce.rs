//! Trailing-edge debounce timer.
//!
//! A [`Debouncer`] runs its callback once `delay` has passed since the most
//! recent [`Debouncer::schedule`] call. Each `schedule` restarts the timer, so
//! a burst of triggers results in a single callback after the burst ends.
//!
//! Every `schedule` returns a ticket that is passed to the callback when that
//! timer fires. Cancelling cannot recall a callback that already ran, so a
//! consumer that forwards firings through a queue compares tickets to spot
//! stale ones.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Restartable delay timer with a callback.
///
/// The timer runs as a Tokio task. Dropping the debouncer cancels it.
pub struct Debouncer {
    delay: Duration,
    callback: Arc<dyn Fn(u64) + Send + Sync>,
    pending: Option<JoinHandle<()>>,
    ticket: u64,
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

impl Debouncer {
    /// Create an idle debouncer.
    pub fn new(delay: Duration, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            callback: Arc::new(callback),
            pending: None,
            ticket: 0,
        }
    }

    /// Start the timer, replacing any pending one. Returns the ticket the
    /// callback will receive.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn schedule(&mut self) -> u64 {
        self.cancel();
        self.ticket += 1;

        let ticket = self.ticket;
        let delay = self.delay;
        let callback = Arc::clone(&self.callback);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(ticket);
        }));
        ticket
    }

    /// Stop the pending timer. Returns whether one was still waiting.
    pub fn cancel(&mut self) -> bool {
        let Some(handle) = self.pending.take() else {
            return false;
        };
        let waiting = !handle.is_finished();
        handle.abort();
        waiting
    }

    /// Whether a timer is waiting to fire.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Ticket of the most recent `schedule`, or 0 before the first one.
    #[must_use]
    pub const fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    fn counting(delay_ms: u64) -> (Debouncer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let debouncer = Debouncer::new(Duration::from_millis(delay_ms), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (debouncer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (mut debouncer, fired) = counting(1000);
        debouncer.schedule();
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_coalesces() {
        let (mut debouncer, fired) = counting(1000);

        for _ in 0..5 {
            debouncer.schedule();
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_timer() {
        let (mut debouncer, fired) = counting(1000);
        assert!(!debouncer.cancel());

        debouncer.schedule();
        assert!(debouncer.cancel());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_receives_latest_ticket() {
        let last = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&last);
        let mut debouncer = Debouncer::new(Duration::from_millis(1000), move |ticket| {
            seen.store(ticket, Ordering::SeqCst);
        });
        assert_eq!(debouncer.ticket(), 0);

        let first = debouncer.schedule();
        let second = debouncer.schedule();
        assert!(second > first);
        assert_eq!(debouncer.ticket(), second);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(last.load(Ordering::SeqCst), second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let (mut debouncer, fired) = counting(1000);
        debouncer.schedule();
        drop(debouncer);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
