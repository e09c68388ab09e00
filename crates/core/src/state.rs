// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State names used by the FSM engine and the registry's lifecycle tracking.

use smol_str::SmolStr;

/// The name of a state in an [`FsmDefinition`](crate) graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StateId(SmolStr);

impl StateId {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for StateId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StateId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The lifecycle state of a machine as seen by the registry.
///
/// Orthogonal to whether a state is "final" within its FSM: an FSM author
/// may put a machine offline in a non-final state (awaiting rehydration) or
/// complete it while still registered. See the registry's eviction policy
/// for how these interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MachineLifecycle {
    /// Registered, in memory, eligible to receive events directly.
    Active,
    /// Evicted from memory; only a persisted snapshot remains. The next
    /// event routed to this id triggers rehydration.
    Offline,
    /// Reached a final FSM state. Never rehydrated; persisted for history.
    Completed,
    /// No record of this id exists in either the registry or the store.
    Unknown,
}

impl MachineLifecycle {
    pub fn is_resident(self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}
