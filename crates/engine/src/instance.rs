// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single running instance of an [`FsmDefinition`], bound to one
//! [`PersistentContext`].

use crate::action::{ActionError, ActionPhase, FireError};
use crate::fsm::FsmDefinition;
use machina_core::{Event, PersistentContext, StateId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Event name a caller may use to build the synthetic `creation_event`
/// passed to [`FsmInstance::new`] when there is no more specific event
/// that caused the machine to come into existence.
pub const CREATION_EVENT_KIND: &str = "__create__";

/// The result of a successful [`FsmInstance::fire`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// The event matched a transition; the machine moved from `from` to
    /// `to` (which may equal `from` for a self-transition that still runs
    /// exit/entry hooks — distinct from a stay action, which runs neither).
    Accepted { from: StateId, to: StateId },
    /// The event matched a stay action: consumed, state unchanged, no
    /// entry/exit hooks ran.
    StayApplied { state: StateId },
    /// No transition or stay action in the current state matched this
    /// event (or every guard that matched the event name rejected it).
    Ignored,
}

/// A live machine: an immutable shared [`FsmDefinition`] plus one mutable
/// [`PersistentContext`] and the bookkeeping the registry and timeout
/// manager need (per-state entry counters).
pub struct FsmInstance<C, P> {
    definition: Arc<FsmDefinition<C, P>>,
    context: C,
    state_entries: HashMap<StateId, u32>,
    /// Monotonically increasing across the instance's whole lifetime,
    /// bumped once per accepted transition (never for stay actions or
    /// ignored events). This is the `stateEntryGeneration` the timeout
    /// manager keys deadlines on: scheduling a deadline on entry to a
    /// timed state and comparing against this counter when the deadline
    /// fires is what makes a stale (superseded) deadline a no-op.
    generation: u64,
}

impl<C: PersistentContext, P> FsmInstance<C, P> {
    /// Create a fresh instance, running the initial state's entry hook
    /// once and recording its first state-entry. `creation_event` stands
    /// in for the triggering event a normal transition would supply — an
    /// initial entry has no real predecessor event, so the caller passes
    /// whatever it treats as the machine's synthetic creation event.
    ///
    /// A failing initial entry hook leaves the context constructed but
    /// with the error surfaced to the caller — there is no prior state to
    /// roll back to, unlike a mid-lifetime `fire`.
    pub fn new(
        definition: Arc<FsmDefinition<C, P>>,
        mut context: C,
        creation_event: &Event<P>,
    ) -> Result<Self, (C, ActionError)> {
        let initial = definition.initial_state().clone();
        context.set_current_state(initial.clone());
        context.set_last_state_change(SystemTime::now());
        let mut state_entries = HashMap::new();
        state_entries.insert(initial.clone(), 1);
        if let Some(state) = definition.state(&initial) {
            if let Some(hook) = &state.on_entry {
                if let Err(err) = hook(&mut context, creation_event) {
                    return Err((context, err));
                }
            }
        }
        Ok(Self { definition, context, state_entries, generation: 0 })
    }

    /// Restore an instance from a previously persisted context, with no
    /// hooks run — rehydration resumes exactly where the machine left off,
    /// it does not re-enter its current state. See
    /// [`crate::instance::FsmInstance::fire`]'s caller (the registry) for
    /// how the timeout manager re-arms deadlines separately.
    pub fn restore(definition: Arc<FsmDefinition<C, P>>, context: C) -> Self {
        let current = context.current_state().clone();
        let mut state_entries = HashMap::new();
        state_entries.insert(current, 1);
        Self { definition, context, state_entries, generation: 0 }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn definition(&self) -> &Arc<FsmDefinition<C, P>> {
        &self.definition
    }

    /// Number of times the given state has been entered (including the
    /// initial entry). Used by the timeout manager as a generation key and
    /// available to FSM authors as an optional circuit breaker via
    /// [`crate::fsm::StateDef::max_visits`].
    pub fn state_entries(&self, state: &StateId) -> u32 {
        self.state_entries.get(state).copied().unwrap_or(0)
    }

    /// The current `stateEntryGeneration` (see the field doc on
    /// [`FsmInstance::generation`]).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply one event to this instance.
    ///
    /// Ordering on an accepted transition: exit hook of the old state,
    /// then the transition's own action, then the entry hook of the new
    /// state. If any of the three returns an error, the context is rolled
    /// back to its pre-`fire` snapshot and no partial mutation is visible.
    pub fn fire(&mut self, event: &Event<P>) -> Result<FireOutcome, FireError> {
        if self.context.is_complete() {
            return Err(FireError::AlreadyComplete { event: event.event_type.to_string() });
        }

        let current = self.context.current_state().clone();
        let Some(state_def) = self.definition.state(&current) else {
            // A context referencing a state this definition no longer
            // declares is a programmer error in topology evolution, not a
            // runtime condition callers can act on differently from
            // "nothing matched".
            return Ok(FireOutcome::Ignored);
        };

        // Transitions take precedence over stay actions with the same
        // event name: the first declared match wins.
        for transition in &state_def.transitions {
            if transition.event != event.event_type {
                continue;
            }
            if let Some(guard) = &transition.guard {
                if !guard(&self.context, event) {
                    continue;
                }
            }

            let snapshot = self.context.deep_copy();
            let target = transition.target.clone();

            if let Some(exit) = &state_def.on_exit {
                if let Err(source) = exit(&mut self.context, event) {
                    self.context = snapshot;
                    return Err(FireError::ActionFailed {
                        phase: ActionPhase::Exit,
                        from: current,
                        source,
                    });
                }
            }

            if let Some(action) = &transition.action {
                if let Err(source) = action(&mut self.context, event) {
                    self.context = snapshot;
                    return Err(FireError::ActionFailed {
                        phase: ActionPhase::Transition,
                        from: current,
                        source,
                    });
                }
            }

            if let Some(target_def) = self.definition.state(&target) {
                if let Some(entry) = &target_def.on_entry {
                    if let Err(source) = entry(&mut self.context, event) {
                        self.context = snapshot;
                        return Err(FireError::ActionFailed {
                            phase: ActionPhase::Entry,
                            from: current,
                            source,
                        });
                    }
                }
            }

            self.context.set_current_state(target.clone());
            self.context.set_last_state_change(SystemTime::now());
            *self.state_entries.entry(target.clone()).or_insert(0) += 1;
            self.generation += 1;

            if let Some(target_def) = self.definition.state(&target) {
                if target_def.is_final() {
                    self.context.set_complete(true);
                }
            }

            return Ok(FireOutcome::Accepted { from: current, to: target });
        }

        for stay in &state_def.stay_actions {
            if stay.event != event.event_type {
                continue;
            }
            if let Some(guard) = &stay.guard {
                if !guard(&self.context, event) {
                    continue;
                }
            }

            let snapshot = self.context.deep_copy();
            if let Err(source) = (stay.action)(&mut self.context, event) {
                self.context = snapshot;
                return Err(FireError::ActionFailed {
                    phase: ActionPhase::Stay,
                    from: current,
                    source,
                });
            }
            // No state change, so `lastStateChange` stays put -- unlike
            // an accepted transition, a stay action never re-enters its
            // state.
            return Ok(FireOutcome::StayApplied { state: current });
        }

        Ok(FireOutcome::Ignored)
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
