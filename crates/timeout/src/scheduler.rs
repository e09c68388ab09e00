// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Where a deadline's "sleep until D, then run this" actually lives.
//!
//! [`TimeoutManager`](crate::TimeoutManager) is generic over [`Scheduler`]
//! so the generation-keyed arming logic can be exercised deterministically
//! in tests ([`ManualScheduler`], gated behind `test-support`) without
//! depending on wall-clock sleeps, while production code runs on
//! [`TokioScheduler`].

use std::time::Duration;

/// One unit of deferred work: run `task` no earlier than `after` from now.
pub trait Scheduler: Send + Sync + 'static {
    fn schedule(&self, after: Duration, task: Box<dyn FnOnce() + Send>);
}

/// Production scheduler: one `tokio::time::sleep` per deadline, run on
/// whatever executor `tokio::spawn` resolves to (the registry's async
/// runtime — §5's "dedicated scheduler thread pool" generalized to tokio
/// tasks rather than a fixed-size thread pool).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, after: Duration, task: Box<dyn FnOnce() + Send>) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            task();
        });
    }
}

/// Test scheduler: deadlines accumulate in a list keyed by a
/// [`machina_core::FakeClock`](machina_core::FakeClock) deadline instant,
/// and only fire when [`ManualScheduler::advance`] walks the clock forward
/// far enough. No tokio runtime required.
#[cfg(any(test, feature = "test-support"))]
pub struct ManualScheduler {
    clock: machina_core::FakeClock,
    pending: parking_lot::Mutex<Vec<(std::time::Instant, Box<dyn FnOnce() + Send>)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl ManualScheduler {
    pub fn new(clock: machina_core::FakeClock) -> Self {
        Self { clock, pending: parking_lot::Mutex::new(Vec::new()) }
    }

    pub fn clock(&self) -> &machina_core::FakeClock {
        &self.clock
    }

    /// Advance the clock by `by` and synchronously run every deadline
    /// whose due instant has now passed, in the order they become due.
    pub fn advance(&self, by: Duration) {
        use machina_core::Clock;
        self.clock.advance(by);
        let now = self.clock.now();
        let due = {
            let mut pending = self.pending.lock();
            let (still_pending, now_due): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *pending).into_iter().partition(|(at, _)| *at > now);
            *pending = still_pending;
            now_due
        };
        for (_, task) in due {
            task();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Scheduler for ManualScheduler {
    fn schedule(&self, after: Duration, task: Box<dyn FnOnce() + Send>) {
        use machina_core::Clock;
        let at = self.clock.now() + after;
        self.pending.lock().push((at, task));
    }
}
