// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generation-keyed deadline scheduling (§4.3).
//!
//! One deadline is ever armed per machine at a time: arming a new one
//! (on entry to a timed state, or on rehydration) supersedes whatever was
//! armed before, and a superseded deadline firing late is a silent no-op
//! rather than a double-delivery. The generation counter that makes this
//! work is [`machina_engine::FsmInstance::generation`] — the timeout
//! manager does not invent its own, it trusts the one the engine already
//! bumps on every accepted transition.

use crate::scheduler::Scheduler;
use dashmap::DashMap;
use machina_core::MachineId;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong delivering a timeout (§7.6). Scheduling
/// itself cannot fail in this design — [`Scheduler::schedule`] is
/// infallible — so this only covers the delivery callback's own outcome,
/// which the registry surfaces as a `WARNING` per the error-handling
/// design.
#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("timeout delivery for machine {machine} failed: {reason}")]
    DeliveryFailed { machine: MachineId, reason: String },
}

/// Schedules and cancels per-machine deadlines, keyed by
/// `(machineId, stateEntryGeneration)`.
///
/// Since a machine can only be in one state at a time, only its single
/// current generation is ever meaningful; the manager stores just that
/// generation per machine rather than a full history.
pub struct TimeoutManager<S: Scheduler> {
    scheduler: Arc<S>,
    armed: Arc<DashMap<MachineId, u64>>,
}

impl<S: Scheduler> TimeoutManager<S> {
    pub fn new(scheduler: Arc<S>) -> Self {
        Self { scheduler, armed: Arc::new(DashMap::new()) }
    }

    /// Arm a deadline for `machine` at `generation`: `on_fire` runs after
    /// `duration` unless the machine leaves the state first ([`cancel`]),
    /// or a later state entry bumps past `generation` ([`arm`] again).
    ///
    /// [`cancel`]: TimeoutManager::cancel
    pub fn arm(
        &self,
        machine: MachineId,
        generation: u64,
        duration: Duration,
        on_fire: impl FnOnce() + Send + 'static,
    ) {
        tracing::trace!(%machine, generation, ?duration, "timeout armed");
        self.armed.insert(machine.clone(), generation);
        let armed = Arc::clone(&self.armed);
        let keyed_machine = machine;
        self.scheduler.schedule(
            duration,
            Box::new(move || {
                let still_current =
                    armed.get(&keyed_machine).map(|g| *g == generation).unwrap_or(false);
                if still_current {
                    tracing::debug!(machine = %keyed_machine, generation, "timeout deadline reached");
                    on_fire();
                } else {
                    tracing::trace!(machine = %keyed_machine, generation, "stale timeout superseded, ignoring");
                }
            }),
        );
    }

    /// Cancel whatever deadline is armed for `machine`, if any. Called on
    /// exit from a timed state and on eviction.
    pub fn cancel(&self, machine: &MachineId) {
        if self.armed.remove(machine).is_some() {
            tracing::trace!(%machine, "timeout cancelled");
        }
    }

    /// Re-arm rule used on rehydration: `remaining = max(0, duration -
    /// elapsed)`. Returns `None` if nothing is left, recording `generation`
    /// as armed regardless so a later superseding deadline is still
    /// correct — delivering the elapsed timeout itself is then the
    /// caller's job, synchronously, before it applies whatever event
    /// triggered the rehydration (see `machina_registry::Registry::rehydrate`).
    /// Returns `Some(remaining)` otherwise, without arming it — the caller
    /// arms it via [`arm`].
    ///
    /// [`arm`]: TimeoutManager::arm
    pub fn remaining_on_rehydrate(
        &self,
        machine: MachineId,
        generation: u64,
        duration: Duration,
        elapsed: Duration,
    ) -> Option<Duration> {
        let remaining = duration.saturating_sub(elapsed);
        if remaining.is_zero() {
            self.armed.insert(machine, generation);
            None
        } else {
            Some(remaining)
        }
    }

    /// Whether a deadline is currently armed for `machine` (for tests and
    /// diagnostics — not used by the firing logic itself).
    pub fn is_armed(&self, machine: &MachineId) -> bool {
        self.armed.contains_key(machine)
    }
}
