// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A cheap, cloneable reference to one resident machine, as returned by
//! [`crate::registry::Registry::create_or_get`].

use crate::machine::ManagedMachine;
use machina_core::{MachineId, PersistentContext, StateId};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A handle to one resident machine's shared state. Cloning a handle is
/// cheap (an `Arc` clone); every clone refers to the same underlying
/// lock, so two handles for the same id never observe interleaved
/// mutation (§3 invariant 5).
pub struct MachineHandle<C, V, P> {
    pub(crate) id: MachineId,
    pub(crate) inner: Arc<Mutex<ManagedMachine<C, V, P>>>,
}

impl<C, V, P> Clone for MachineHandle<C, V, P> {
    fn clone(&self) -> Self {
        Self { id: self.id.clone(), inner: Arc::clone(&self.inner) }
    }
}

impl<C: PersistentContext, V, P> MachineHandle<C, V, P> {
    pub fn id(&self) -> &MachineId {
        &self.id
    }

    /// The machine's current state, as of the last completed `fire`.
    /// Takes the same lock `fire` would, so this reflects a consistent
    /// snapshot rather than a torn read.
    pub async fn current_state(&self) -> StateId {
        self.inner.lock().await.instance.context().current_state().clone()
    }

    pub async fn is_complete(&self) -> bool {
        self.inner.lock().await.instance.context().is_complete()
    }
}
