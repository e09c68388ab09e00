// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative registry configuration, built the way the rest of the
//! workspace builds its config structs (`machina_core::setters!`).

/// Tunables for one [`crate::registry::Registry`] instance (§4.2, §5).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Hard cap on concurrently resident (in-memory) machines. `None`
    /// disables the check.
    pub max_concurrent_machines: Option<usize>,
    /// Registry-wide events-per-second budget enforced by a token
    /// bucket. `None` disables the check.
    pub max_events_per_second: Option<u32>,
    /// Capacity of the listener fanout channel (§5 "listener backlog is
    /// bounded with drop-oldest semantics").
    pub listener_capacity: usize,
    /// Whether to attach a serialized snapshot of the persistent context
    /// to every emitted [`machina_wire::TransitionRecord`]. Opt-in since
    /// it can be large and most listeners only care about the
    /// transition itself.
    pub attach_context_snapshot: bool,
    /// Whether `fire` waits for the persistence save to complete before
    /// returning (`Synchronous`), or returns immediately after the
    /// in-memory transition and lets the save happen in the background
    /// (`Deferred`). This is the open knob `spec.md` §9 leaves to
    /// configuration rather than a hidden default.
    pub save_mode: SaveMode,
    /// Ceiling on retry attempts for a failed persistence save before
    /// the failure is escalated from a `WARNING` to an `ERROR` listener
    /// event (§7.4).
    pub max_save_retries: u32,
}

/// §9 Open Question: whether `fire`'s persistence save is synchronous or
/// deferred. Exposed as an explicit knob rather than a hidden default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// `fire` does not return until the save (and any retries within
    /// [`RegistryConfig::max_save_retries`]) has been attempted.
    Synchronous,
    /// `fire` returns as soon as the in-memory transition is applied;
    /// the save runs on a spawned task. Narrower durability window, per
    /// §5 "Suspension points".
    Deferred,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_machines: None,
            max_events_per_second: None,
            listener_capacity: 1024,
            attach_context_snapshot: false,
            save_mode: SaveMode::Synchronous,
            max_save_retries: 5,
        }
    }
}

impl RegistryConfig {
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfigBuilder {
    inner: RegistryConfig,
}

impl Default for RegistryConfigBuilder {
    fn default() -> Self {
        Self { inner: RegistryConfig::default() }
    }
}

impl RegistryConfigBuilder {
    pub fn max_concurrent_machines(mut self, n: usize) -> Self {
        self.inner.max_concurrent_machines = Some(n);
        self
    }

    pub fn max_events_per_second(mut self, n: u32) -> Self {
        self.inner.max_events_per_second = Some(n);
        self
    }

    pub fn listener_capacity(mut self, n: usize) -> Self {
        self.inner.listener_capacity = n;
        self
    }

    pub fn attach_context_snapshot(mut self, attach: bool) -> Self {
        self.inner.attach_context_snapshot = attach;
        self
    }

    pub fn save_mode(mut self, mode: SaveMode) -> Self {
        self.inner.save_mode = mode;
        self
    }

    pub fn max_save_retries(mut self, n: u32) -> Self {
        self.inner.max_save_retries = n;
        self
    }

    pub fn build(self) -> RegistryConfig {
        self.inner
    }
}
