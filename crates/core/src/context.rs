// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability traits for the two halves of a machine's working state.

use crate::state::StateId;
use std::time::SystemTime;

/// The durable half of a machine instance: everything that must survive
/// eviction and rehydration.
///
/// Implemented by the root context type an FSM author defines for their
/// entity (a call, an SMS session, an order). Child entities reachable from
/// the root additionally implement [`crate::entity::ShardingEntity`] to opt
/// into selective graph persistence.
pub trait PersistentContext: Send + 'static {
    /// The machine identifier. Stable for the lifetime of the instance.
    fn id(&self) -> &str;

    /// The name of the state the FSM is currently in.
    fn current_state(&self) -> &StateId;

    fn set_current_state(&mut self, state: StateId);

    /// Wall-clock time of the last accepted transition. A stay action
    /// consumes an event without changing state, so it never updates
    /// this. Used by the timeout manager to compute remaining deadline
    /// on rehydration.
    fn last_state_change(&self) -> SystemTime;

    fn set_last_state_change(&mut self, at: SystemTime);

    /// Whether this machine has reached a final state. Once `true`, the
    /// registry never re-admits it and the engine rejects further events.
    fn is_complete(&self) -> bool;

    fn set_complete(&mut self, complete: bool);

    /// A deep copy used before applying a transition so that a failed
    /// user action can be rolled back without leaving partial mutations
    /// visible to a concurrent read.
    fn deep_copy(&self) -> Self
    where
        Self: Sized;
}

/// Marker for the non-durable half of a machine instance: connection
/// handles, in-flight timers, caches — anything rebuilt fresh on every
/// rehydration rather than read from the persistence provider.
///
/// Volatile context is produced by a factory closure supplied at
/// registration time, never by deserializing a snapshot.
pub trait VolatileContext: Send + 'static {}

impl VolatileContext for () {}
