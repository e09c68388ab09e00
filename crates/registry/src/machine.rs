// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The resident representation of one active machine: its [`FsmInstance`]
//! plus its volatile context, behind the single lock that gives §3
//! invariant 5 ("at most one concurrent event is applied to any single
//! machine instance").

use machina_engine::FsmInstance;

/// One resident machine. Wrapped in `Arc<tokio::sync::Mutex<..>>` by the
/// registry.
///
/// A `tokio::sync::Mutex` is used rather than `parking_lot` (the
/// workspace's usual choice, see `machina-timeout`) because the critical
/// section this guards spans an `.await` — the persistence save that
/// `fire` performs before releasing the lock (§5: "`fire` acquires the
/// machine's lock for the duration of transition → entry action →
/// save → eviction"). Holding a `parking_lot::MutexGuard` across an
/// await point is both disallowed by the type (it isn't `Send`) and the
/// wrong tool once a genuine suspension point is in the critical
/// section.
pub struct ManagedMachine<C, V, P> {
    pub instance: FsmInstance<C, P>,
    pub volatile: V,
}

impl<C, V, P> ManagedMachine<C, V, P> {
    pub fn new(instance: FsmInstance<C, P>, volatile: V) -> Self {
        Self { instance, volatile }
    }
}
