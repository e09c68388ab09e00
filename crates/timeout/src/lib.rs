// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! machina-timeout: per-state deadline scheduling that survives eviction
//! and rehydration (§4.3).
//!
//! This crate knows nothing about FSM topology or the registry that owns
//! a machine — it is handed a duration, a generation number, and a
//! closure to call when the deadline is due, and it is responsible only
//! for calling that closure at most once, and only if nothing superseded
//! it first.

pub mod manager;
pub mod scheduler;

pub use manager::{TimeoutError, TimeoutManager};
pub use scheduler::{Scheduler, TokioScheduler};

#[cfg(any(test, feature = "test-support"))]
pub use scheduler::ManualScheduler;
