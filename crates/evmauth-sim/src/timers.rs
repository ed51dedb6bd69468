//! Cancellable group of session timers
//!
//! Every delayed transition and the synthesis loop run as tasks in one
//! [`JoinSet`]. Cancelling the group aborts them all and refuses new ones.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Timers of one session, cancelled together
#[derive(Default)]
pub struct TimerGroup {
    tasks: Mutex<JoinSet<()>>,
    cancelled: AtomicBool,
}

impl TimerGroup {
    /// Empty, live group
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fire` once after `delay`. Returns false if the group is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        })
    }

    /// Run `tick` every `period`, first after one full period, until it returns false
    pub fn every<F>(&self, period: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !tick() {
                    break;
                }
            }
        })
    }

    fn spawn<Fut>(&self, task: Fut) -> bool
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
        true
    }

    /// Abort every outstanding timer; later scheduling is refused
    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock();
        self.cancelled.store(true, Ordering::Release);
        tasks.abort_all();
    }

    /// Whether [`TimerGroup::cancel_all`] has run
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Timers spawned and not yet reaped
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// No timers outstanding
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for TimerGroup {
    fn drop(&mut self) {
        self.tasks.get_mut().abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_after_delay() {
        let timers = TimerGroup::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        assert!(timers.schedule(Duration::from_secs(3), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(2_999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timer_fires_after_cancel() {
        let timers = TimerGroup::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for delay in [1, 2, 3] {
            let counter = Arc::clone(&fired);
            timers.schedule(Duration::from_secs(delay), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        let counter = Arc::clone(&fired);
        timers.every(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        timers.cancel_all();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timers.is_cancelled());
        assert!(!timers.schedule(Duration::ZERO, || {}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_stops_when_tick_declines() {
        let timers = TimerGroup::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        timers.every(Duration::from_secs(10), move || counter.fetch_add(1, Ordering::SeqCst) < 2);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
