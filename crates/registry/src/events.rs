// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The registry's own broadcast bus (§6): a single `tokio::sync::broadcast`
//! channel carrying both the listener event taxonomy and per-machine
//! transition records to every subscriber, with drop-oldest semantics for
//! slow listeners built in by `broadcast`'s own lagged-receiver behavior —
//! no separate bounded-queue-plus-eviction-policy to hand-roll.

use machina_wire::{ListenerEvent, TransitionRecord};

/// One event delivered to every [`crate::registry::Registry::subscribe`]
/// receiver.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Listener(ListenerEvent),
    Transition(TransitionRecord),
}
