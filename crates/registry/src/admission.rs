// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission control (§4.2): the hard concurrency cap and the
//! registry-wide TPS token bucket. Per-machine event rate is explicitly
//! unenforced here — that is the caller's responsibility per §4.2.

use crate::error::AdmissionError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A simple token-bucket rate limiter: `capacity` tokens, refilled
/// continuously at `rate` tokens/second, never exceeding `capacity`.
struct TokenBucket {
    capacity: f64,
    rate_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: u32) -> Self {
        let rate = rate_per_sec as f64;
        Self { capacity: rate, rate_per_sec: rate, tokens: rate, last_refill: Instant::now() }
    }

    fn try_take_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Registry-wide admission control: the hard concurrency cap and the TPS
/// guard, plus the shutdown latch that refuses everything once tripped.
pub struct AdmissionControl {
    max_concurrent_machines: Option<usize>,
    bucket: Option<Mutex<TokenBucket>>,
    shutting_down: AtomicBool,
}

impl AdmissionControl {
    pub fn new(max_concurrent_machines: Option<usize>, max_events_per_second: Option<u32>) -> Self {
        Self {
            max_concurrent_machines,
            bucket: max_events_per_second.map(|tps| Mutex::new(TokenBucket::new(tps))),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    /// Gate for every `fire` call, admission or not: the TPS budget
    /// applies "across the registry" (§4.2), independent of whether the
    /// event targets an already-resident machine.
    pub fn check_event(&self) -> Result<(), AdmissionError> {
        if self.is_shutting_down() {
            return Err(AdmissionError::Shutdown);
        }
        if let Some(bucket) = &self.bucket {
            if !bucket.lock().try_take_at(Instant::now()) {
                return Err(AdmissionError::Throttled);
            }
        }
        Ok(())
    }

    /// Gate for admitting a brand-new machine, given the current
    /// resident count.
    pub fn check_new_machine(&self, current_count: usize) -> Result<(), AdmissionError> {
        if self.is_shutting_down() {
            return Err(AdmissionError::Shutdown);
        }
        if let Some(max) = self.max_concurrent_machines {
            if current_count >= max {
                return Err(AdmissionError::CapacityExceeded);
            }
        }
        Ok(())
    }
}
