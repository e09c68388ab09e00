// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The named hook/guard/action registry an embedder fills in before turning
//! a parsed topology into a live [`machina_engine::FsmDefinition`].
//!
//! HCL describes the *shape* of a graph -- states, transitions, timeouts --
//! but guards and actions are Rust closures with real side effects, so the
//! document can only reference them by name. [`ActionRegistry`] is where the
//! application root binds those names to code, the same way it builds the
//! rest of its process-wide structures (§9): constructed once, handed to
//! [`crate::build_definition`], no global statics involved.

use std::collections::HashMap;
use std::sync::Arc;

use machina_core::Event;
use machina_engine::ActionError;

use crate::error::TopologyError;

/// A named `on_entry`/`on_exit` hook:
/// `Fn(&mut C, &Event<P>) -> Result<(), ActionError>`.
pub trait EntryHook<C, P>: Send + Sync {
    fn call(&self, ctx: &mut C, event: &Event<P>) -> Result<(), ActionError>;
}

impl<C, P, F> EntryHook<C, P> for F
where
    F: Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync,
{
    fn call(&self, ctx: &mut C, event: &Event<P>) -> Result<(), ActionError> {
        self(ctx, event)
    }
}

/// A named transition guard: `Fn(&C, &Event<P>) -> bool`.
pub trait NamedGuard<C, P>: Send + Sync {
    fn check(&self, ctx: &C, event: &Event<P>) -> bool;
}

impl<C, P, F> NamedGuard<C, P> for F
where
    F: Fn(&C, &Event<P>) -> bool + Send + Sync,
{
    fn check(&self, ctx: &C, event: &Event<P>) -> bool {
        self(ctx, event)
    }
}

/// A named transition/stay action: `Fn(&mut C, &Event<P>) -> Result<(), ActionError>`.
pub trait NamedAction<C, P>: Send + Sync {
    fn run(&self, ctx: &mut C, event: &Event<P>) -> Result<(), ActionError>;
}

impl<C, P, F> NamedAction<C, P> for F
where
    F: Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync,
{
    fn run(&self, ctx: &mut C, event: &Event<P>) -> Result<(), ActionError> {
        self(ctx, event)
    }
}

/// Names -> callbacks, filled in by the application root and handed to
/// [`crate::build_definition`]. Cheap to clone: every entry is `Arc`-backed.
pub struct ActionRegistry<C, P> {
    hooks: HashMap<String, Arc<dyn EntryHook<C, P>>>,
    guards: HashMap<String, Arc<dyn NamedGuard<C, P>>>,
    actions: HashMap<String, Arc<dyn NamedAction<C, P>>>,
}

impl<C, P> Default for ActionRegistry<C, P> {
    fn default() -> Self {
        Self {
            hooks: HashMap::new(),
            guards: HashMap::new(),
            actions: HashMap::new(),
        }
    }
}

impl<C, P> ActionRegistry<C, P>
where
    C: 'static,
    P: 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hook(
        mut self,
        name: impl Into<String>,
        hook: impl Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    #[must_use]
    pub fn guard(
        mut self,
        name: impl Into<String>,
        guard: impl Fn(&C, &Event<P>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.guards.insert(name.into(), Arc::new(guard));
        self
    }

    #[must_use]
    pub fn action(
        mut self,
        name: impl Into<String>,
        action: impl Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    pub(crate) fn resolve_hook(&self, name: &str) -> Option<Arc<dyn EntryHook<C, P>>> {
        self.hooks.get(name).cloned()
    }

    pub(crate) fn resolve_guard(&self, name: &str) -> Option<Arc<dyn NamedGuard<C, P>>> {
        self.guards.get(name).cloned()
    }

    pub(crate) fn resolve_action(&self, name: &str) -> Option<Arc<dyn NamedAction<C, P>>> {
        self.actions.get(name).cloned()
    }
}

pub(crate) fn require_hook<C, P>(
    registry: &ActionRegistry<C, P>,
    state: &str,
    name: &str,
) -> Result<Arc<dyn EntryHook<C, P>>, TopologyError>
where
    C: 'static,
    P: 'static,
{
    registry
        .resolve_hook(name)
        .ok_or_else(|| TopologyError::UnknownHook(state.to_string(), name.to_string()))
}

pub(crate) fn require_guard<C, P>(
    registry: &ActionRegistry<C, P>,
    state: &str,
    transition: &str,
    name: &str,
) -> Result<Arc<dyn NamedGuard<C, P>>, TopologyError>
where
    C: 'static,
    P: 'static,
{
    registry.resolve_guard(name).ok_or_else(|| {
        TopologyError::UnknownGuard(state.to_string(), transition.to_string(), name.to_string())
    })
}

pub(crate) fn require_action<C, P>(
    registry: &ActionRegistry<C, P>,
    state: &str,
    transition: &str,
    name: &str,
) -> Result<Arc<dyn NamedAction<C, P>>, TopologyError>
where
    C: 'static,
    P: 'static,
{
    registry.resolve_action(name).ok_or_else(|| {
        TopologyError::UnknownAction(state.to_string(), transition.to_string(), name.to_string())
    })
}
