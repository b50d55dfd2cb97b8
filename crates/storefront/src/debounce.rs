//! Trailing-edge debounce timer.
//!
//! A [`Debouncer`] is either `Idle` or `Pending` until a deadline. Scheduling
//! while pending cancels the old timer and starts a new one, so a burst of
//! triggers produces a single action timed from the last trigger.
//!
//! Only the waiting part can be cancelled. Once the deadline passes (or
//! [`Debouncer::fire_now`] is called) the action is spawned as its own task
//! and runs to completion even if the debouncer is rescheduled or dropped.
//!
//! Timers use `tokio::time`, so tests drive them with a paused clock
//! (`#[tokio::test(start_paused = true)]`) instead of real waits.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Action = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type ActionSlot = Arc<Mutex<Option<Action>>>;

/// Observable state of a [`Debouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: Instant },
}

struct Pending {
    deadline: Instant,
    action: ActionSlot,
    timer: JoinHandle<()>,
}

fn take_action(slot: &ActionSlot) -> Option<Action> {
    slot.lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take()
}

fn has_action(slot: &ActionSlot) -> bool {
    slot.lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .is_some()
}

/// A restartable one-shot timer.
pub struct Debouncer {
    delay: Duration,
    handle: Handle,
    pending: Option<Pending>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Debouncer {
    /// Create an idle debouncer that spawns onto `handle`.
    #[must_use]
    pub const fn new(delay: Duration, handle: Handle) -> Self {
        Self {
            delay,
            handle,
            pending: None,
        }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Current state. A timer whose action already started reports `Idle`.
    #[must_use]
    pub fn state(&self) -> DebounceState {
        match &self.pending {
            Some(pending) if has_action(&pending.action) => DebounceState::Pending {
                deadline: pending.deadline,
            },
            _ => DebounceState::Idle,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state(), DebounceState::Pending { .. })
    }

    /// Cancel any pending timer and run `action` after the configured delay.
    pub fn schedule<F>(&mut self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule_after(self.delay, action);
    }

    /// Cancel any pending timer and run `action` after `delay`.
    pub fn schedule_after<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let deadline = Instant::now() + delay;
        let action: Action = Box::pin(action);
        let slot: ActionSlot = Arc::new(Mutex::new(Some(action)));
        let timer_slot = Arc::clone(&slot);
        let spawner = self.handle.clone();
        let timer = self.handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(action) = take_action(&timer_slot) {
                spawner.spawn(action);
            }
        });
        self.pending = Some(Pending {
            deadline,
            action: slot,
            timer,
        });
    }

    /// Return to `Idle` without running the pending action.
    ///
    /// Returns `true` if an action was discarded.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some_and(|pending| {
            pending.timer.abort();
            take_action(&pending.action).is_some()
        })
    }

    /// Skip the rest of the wait and start the pending action immediately.
    ///
    /// Returns the action's task handle, or `None` if nothing was pending.
    pub fn fire_now(&mut self) -> Option<JoinHandle<()>> {
        let pending = self.pending.take()?;
        pending.timer.abort();
        take_action(&pending.action).map(|action| self.handle.spawn(action))
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter_action(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Let spawned tasks observe the advanced clock.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn debouncer(secs: u64) -> Debouncer {
        Debouncer::new(Duration::from_secs(secs), Handle::current())
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut debouncer = debouncer(2);

        debouncer.schedule(counter_action(&fired));
        assert!(debouncer.is_pending());

        tokio::time::advance(Duration::from_millis(1999)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.state(), DebounceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_restarts_the_window() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut debouncer = debouncer(2);

        for _ in 0..5 {
            debouncer.schedule(counter_action(&fired));
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_action() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut debouncer = debouncer(1);

        debouncer.schedule(counter_action(&fired));
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_now_runs_without_waiting() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut debouncer = debouncer(60);

        debouncer.schedule(counter_action(&fired));
        let task = debouncer.fire_now().expect("action was pending");
        task.await.expect("action task completes");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(debouncer.fire_now().is_none());

        // The aborted timer must not run the action a second time.
        tokio::time::advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_state_reports_deadline() {
        let mut debouncer = debouncer(3);
        let start = Instant::now();
        debouncer.schedule(async {});
        assert_eq!(
            debouncer.state(),
            DebounceState::Pending {
                deadline: start + Duration::from_secs(3)
            }
        );
    }
}
