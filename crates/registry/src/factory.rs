// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three closures a caller supplies once per machine *type* (not per
//! instance) so the registry can construct and reconstruct machines
//! without knowing their concrete persistent/volatile context shapes.

use machina_core::MachineId;
use std::sync::Arc;

/// Supplied to [`crate::registry::Registry::create_or_get`] and
/// [`crate::registry::Registry::fire`]: everything needed to build a
/// brand-new instance, and to rebuild the volatile half on rehydration.
///
/// Cheaply cloneable — every field is an `Arc`-wrapped closure — so
/// callers typically build one per machine type at startup and clone it
/// into every `fire` call rather than reconstructing it.
pub struct MachineFactory<C, V, P> {
    /// Builds a brand-new persistent context for a freshly admitted
    /// machine id. Never called during rehydration — there the
    /// persisted root is deserialized instead (see
    /// [`machina_storage::hydrate`]).
    pub persistent: Arc<dyn Fn(&MachineId) -> C + Send + Sync>,
    /// (Re)builds the volatile context. Called both on first admission
    /// and on every rehydration — volatile state never survives
    /// eviction (§3 "Volatile context").
    pub volatile: Arc<dyn Fn() -> V + Send + Sync>,
    /// Produces the payload for the synthetic timeout event fired when
    /// a state's deadline elapses (§4.3). Most FSMs never inspect a
    /// timeout event's payload, so this is typically a constant/default
    /// value constructor.
    pub timeout_payload: Arc<dyn Fn() -> P + Send + Sync>,
}

impl<C, V, P> Clone for MachineFactory<C, V, P> {
    fn clone(&self) -> Self {
        Self {
            persistent: Arc::clone(&self.persistent),
            volatile: Arc::clone(&self.volatile),
            timeout_payload: Arc::clone(&self.timeout_payload),
        }
    }
}

impl<C, V, P> MachineFactory<C, V, P> {
    pub fn new(
        persistent: impl Fn(&MachineId) -> C + Send + Sync + 'static,
        volatile: impl Fn() -> V + Send + Sync + 'static,
        timeout_payload: impl Fn() -> P + Send + Sync + 'static,
    ) -> Self {
        Self {
            persistent: Arc::new(persistent),
            volatile: Arc::new(volatile),
            timeout_payload: Arc::new(timeout_payload),
        }
    }
}
