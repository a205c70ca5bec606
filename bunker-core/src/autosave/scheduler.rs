//! Cancelable delayed tasks.
//!
//! [`TokioScheduler`] runs on the tokio timer. [`VirtualScheduler`] keeps its
//! own clock that only moves through [`VirtualScheduler::advance`], so tests
//! can step through quiet periods without sleeping.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A unit of deferred work.
pub type Task = BoxFuture<'static, ()>;

/// Runs a task once a delay has elapsed unless it is cancelled first.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;
}

/// Handle to a scheduled task.
///
/// Cancelling before the task fires guarantees it never runs. Cancelling
/// after it fired has no effect; the task runs to completion.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// =========================================================================
// Tokio
// =========================================================================

/// Real-time scheduler. Must be used from inside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let token = handle.token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => task.await,
            }
        });

        handle
    }
}

// =========================================================================
// Virtual clock
// =========================================================================

struct Queued {
    due: Duration,
    seq: u64,
    token: CancellationToken,
    task: Task,
}

#[derive(Default)]
struct VirtualState {
    now: Duration,
    seq: u64,
    queue: Vec<Queued>,
}

impl VirtualState {
    /// Remove and return the earliest live task due at or before `until`.
    fn pop_due(&mut self, until: Duration) -> Option<Queued> {
        self.queue.retain(|q| !q.token.is_cancelled());
        let index = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, q)| q.due <= until)
            .min_by_key(|(_, q)| (q.due, q.seq))
            .map(|(index, _)| index)?;
        Some(self.queue.swap_remove(index))
    }
}

/// Deterministic scheduler driven by an explicit virtual clock.
///
/// Clones share the same clock and queue.
#[derive(Clone, Default)]
pub struct VirtualScheduler {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Tasks scheduled and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.lock()
            .queue
            .iter()
            .filter(|q| !q.token.is_cancelled())
            .count()
    }

    /// Move the clock forward by `by`, running every task that falls due in
    /// due-time order. Each task is awaited before the next one fires. Tasks
    /// scheduled while advancing fire too if they fall due in the window.
    pub async fn advance(&self, by: Duration) {
        let until = self.now() + by;

        loop {
            let next = {
                let mut state = self.lock();
                let next = state.pop_due(until);
                if let Some(queued) = &next {
                    state.now = queued.due;
                }
                next
            };

            match next {
                Some(queued) => queued.task.await,
                None => break,
            }
        }

        self.lock().now = until;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut state = self.lock();
        let seq = state.seq;
        state.seq += 1;
        let due = state.now + delay;
        state.queue.push(Queued {
            due,
            seq,
            token: handle.token.clone(),
            task,
        });
        handle
    }
}

impl std::fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}
