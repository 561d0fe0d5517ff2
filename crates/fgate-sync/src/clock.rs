//! Scheduling port.
//!
//! The sync engine never reads the wall clock or sleeps directly; it goes
//! through [`Scheduler`], so timer behavior is testable without real
//! wall-clock waits.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;

/// Clock and timer facility used by the sync engine.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Current time in epoch millis.
    fn now_millis(&self) -> u64;

    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Production scheduler backed by the system clock and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

struct Waiter {
    deadline: u64,
    tx: oneshot::Sender<()>,
}

/// Hand-advanced scheduler for deterministic tests.
///
/// `sleep` registers a deadline and resolves only once [`advance`] moves
/// the clock past it.
///
/// [`advance`]: ManualScheduler::advance
pub struct ManualScheduler {
    now: Mutex<u64>,
    waiters: Mutex<Vec<Waiter>>,
}

impl ManualScheduler {
    /// Create a scheduler starting at the given epoch-millis instant.
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Mutex::new(start_millis),
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward, waking every sleeper whose deadline has
    /// passed.
    pub fn advance(&self, delta: Duration) {
        let now = {
            let mut now = self.now.lock().unwrap();
            *now += delta.as_millis() as u64;
            *now
        };

        let due: Vec<Waiter> = {
            let mut waiters = self.waiters.lock().unwrap();
            let (due, pending) = std::mem::take(&mut *waiters)
                .into_iter()
                .partition(|w| w.deadline <= now);
            *waiters = pending;
            due
        };

        for waiter in due {
            let _ = waiter.tx.send(());
        }
    }

    /// Number of sleepers currently waiting on the clock.
    pub fn pending(&self) -> usize {
        self.waiters.lock().unwrap().len()
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    fn now_millis(&self) -> u64 {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        let (tx, rx) = oneshot::channel();
        {
            let deadline = self.now_millis() + duration.as_millis() as u64;
            self.waiters.lock().unwrap().push(Waiter { deadline, tx });
        }
        let _ = rx.await;
    }
}
