// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors raised by user-supplied entry/exit/transition/stay actions.

use machina_core::StateId;
use thiserror::Error;

/// An error raised from inside a user action closure (entry, exit,
/// transition, or stay).
///
/// Actions return `Result<(), ActionError>` rather than panicking; a
/// failing action aborts the in-flight `fire` call and rolls the context
/// back to its pre-transition snapshot (see [`crate::instance::FsmInstance::fire`]).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Which phase of a `fire` call an [`ActionError`] was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Exit,
    Transition,
    Entry,
    Stay,
}

impl std::fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ActionPhase::Exit => "exit",
            ActionPhase::Transition => "transition",
            ActionPhase::Entry => "entry",
            ActionPhase::Stay => "stay",
        })
    }
}

/// Everything that can go wrong calling [`crate::instance::FsmInstance::fire`].
#[derive(Debug, Error)]
pub enum FireError {
    /// A user action raised an error; the context was rolled back to its
    /// state before this `fire` call and no transition took effect.
    #[error("{phase} action failed while firing from {from}: {source}")]
    ActionFailed {
        phase: ActionPhase,
        from: StateId,
        #[source]
        source: ActionError,
    },

    /// `fire` was called on a machine that has already reached a final
    /// state. Always a no-op, never an error condition the caller needs to
    /// react to differently from `Ignored` — kept distinct only for
    /// diagnostics.
    #[error("machine is already complete; event {event} ignored")]
    AlreadyComplete { event: String },
}
