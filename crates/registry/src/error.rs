// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission and resolution failures (§4.2, §7.2).

use machina_engine::ActionError;
use machina_storage::StorageError;
use thiserror::Error;

/// Admission control rejection (§4.2, §7.2). Never mutates any machine
/// state — the caller's event or creation attempt simply did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Admitting a new machine would exceed `max_concurrent_machines`.
    #[error("capacity exceeded")]
    CapacityExceeded,
    /// The registry-wide TPS token bucket had no token available.
    #[error("throttled")]
    Throttled,
    /// `shutdown()` has been called; no new admission or event dispatch
    /// is accepted.
    #[error("registry is shutting down")]
    Shutdown,
}

/// Everything [`crate::registry::Registry::create_or_get`] can fail with.
///
/// Distinct from [`AdmissionError`] because a resolution failure can also
/// come from persistence (§7.5) or from the rehydration refusal rule for
/// completed machines — neither of which is an admission-control decision.
#[derive(Debug, Error)]
pub enum CreateOrGetError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// The persisted root was found but `complete = true`: rehydration is
    /// refused and the machine is never readmitted (§4.2 eviction policy,
    /// §8 "no-op on complete").
    #[error("machine is complete and cannot be rehydrated")]
    Completed,

    /// Persistence failed while loading the root during rehydration
    /// (§7.5): no machine is created, and the arrival event (if any) must
    /// be reported `Failed(LoadError)` to the synchronous caller.
    #[error("failed to load persisted state: {0}")]
    LoadFailed(#[source] StorageError),

    /// The initial state's entry action failed while constructing a
    /// brand-new instance. No machine is admitted; the caller's event (if
    /// any) is reported `Failed`.
    #[error("initial entry action failed: {0}")]
    InitialEntryFailed(#[source] ActionError),
}
