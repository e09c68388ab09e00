// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fluent definition of an FSM graph: states, guarded transitions, stay
//! actions, and entry/exit hooks.
//!
//! An [`FsmDefinition`] is immutable once built and is typically
//! constructed exactly once per machine *type* and shared (behind an `Arc`)
//! across every instance of that type — it holds no per-instance state.

use crate::action::ActionError;
use machina_core::{Event, EventKind, StateId};
use std::collections::HashMap;
use std::fmt;

type Guard<C, P> = Box<dyn Fn(&C, &Event<P>) -> bool + Send + Sync>;
type Action<C, P> = Box<dyn Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync>;
/// An entry/exit hook, receiving the event that triggered the transition
/// (or, for the initial state, the synthetic creation event passed to
/// [`crate::instance::FsmInstance::new`]).
type Hook<C, P> = Box<dyn Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync>;

/// A guarded transition out of a state into another (or the same) state.
pub struct Transition<C, P> {
    pub(crate) event: EventKind,
    pub(crate) guard: Option<Guard<C, P>>,
    pub(crate) target: StateId,
    pub(crate) action: Option<Action<C, P>>,
}

/// An action that runs without leaving the current state — the event is
/// consumed, exit/entry hooks do *not* fire, but the action still runs
/// under the same rollback-on-error guarantee as a transition.
pub struct StayAction<C, P> {
    pub(crate) event: EventKind,
    pub(crate) guard: Option<Guard<C, P>>,
    pub(crate) action: Action<C, P>,
}

/// A state's deadline declaration: fire a synthetic timeout event after
/// `duration` in this state, landing on `target`. Scheduling and
/// generation-keyed cancellation is the timeout manager's job (see
/// `machina-timeout`); the engine only declares the fact.
#[derive(Debug, Clone)]
pub struct StateTimeout {
    pub duration: std::time::Duration,
    pub target: StateId,
}

/// One state in the graph: its hooks, its outgoing transitions, and its
/// stay actions.
pub struct StateDef<C, P> {
    pub(crate) name: StateId,
    pub(crate) is_final: bool,
    /// An offline state triggers save-and-evict on entry (§4.2 eviction
    /// policy). Orthogonal to `is_final` — an FSM author may mark a
    /// non-final state offline to park a machine awaiting a future event.
    pub(crate) is_offline: bool,
    pub(crate) on_entry: Option<Hook<C, P>>,
    pub(crate) on_exit: Option<Hook<C, P>>,
    pub(crate) transitions: Vec<Transition<C, P>>,
    pub(crate) stay_actions: Vec<StayAction<C, P>>,
    pub(crate) timeout: Option<StateTimeout>,
    /// Optional circuit breaker: re-entering this state more than this
    /// many times (tracked by the instance, see
    /// [`crate::instance::FsmInstance::state_entries`]) is a policy
    /// decision left to the caller — the engine only exposes the counter.
    pub(crate) max_visits: Option<u32>,
}

impl<C, P> StateDef<C, P> {
    fn new(name: StateId) -> Self {
        Self {
            name,
            is_final: false,
            is_offline: false,
            on_entry: None,
            on_exit: None,
            transitions: Vec::new(),
            stay_actions: Vec::new(),
            timeout: None,
            max_visits: None,
        }
    }

    pub fn name(&self) -> &StateId {
        &self.name
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_offline(&self) -> bool {
        self.is_offline
    }

    pub fn timeout(&self) -> Option<&StateTimeout> {
        self.timeout.as_ref()
    }

    pub fn max_visits(&self) -> Option<u32> {
        self.max_visits
    }
}

/// An immutable FSM graph shared by every instance of one machine type.
pub struct FsmDefinition<C, P> {
    pub(crate) states: HashMap<StateId, StateDef<C, P>>,
    pub(crate) initial: StateId,
}

impl<C, P> FsmDefinition<C, P> {
    pub fn builder() -> FsmBuilder<C, P> {
        FsmBuilder::new()
    }

    pub fn initial_state(&self) -> &StateId {
        &self.initial
    }

    pub fn state(&self, name: &StateId) -> Option<&StateDef<C, P>> {
        self.states.get(name)
    }

    pub fn contains_state(&self, name: &StateId) -> bool {
        self.states.contains_key(name)
    }
}

#[derive(Debug)]
pub enum FsmBuildError {
    NoInitialState,
    UnknownInitialState(StateId),
    DanglingTransition { from: StateId, event: EventKind, to: StateId },
    DanglingTimeout { from: StateId, to: StateId },
    NoStates,
}

impl fmt::Display for FsmBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsmBuildError::NoInitialState => write!(f, "no initial state declared"),
            FsmBuildError::NoStates => write!(f, "no states declared"),
            FsmBuildError::UnknownInitialState(s) => {
                write!(f, "initial state {s} was never declared")
            }
            FsmBuildError::DanglingTransition { from, event, to } => write!(
                f,
                "transition from {from} on {event} targets undeclared state {to}"
            ),
            FsmBuildError::DanglingTimeout { from, to } => {
                write!(f, "timeout on {from} targets undeclared state {to}")
            }
        }
    }
}

impl std::error::Error for FsmBuildError {}

/// Fluent top-level builder: `FsmDefinition::builder().initial(..).state(..).build()`.
pub struct FsmBuilder<C, P> {
    states: HashMap<StateId, StateDef<C, P>>,
    initial: Option<StateId>,
}

impl<C, P> FsmBuilder<C, P> {
    pub fn new() -> Self {
        Self { states: HashMap::new(), initial: None }
    }

    pub fn initial(mut self, state: impl Into<StateId>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Declare a state, configuring its hooks, transitions and stay
    /// actions via a nested builder.
    pub fn state(
        mut self,
        name: impl Into<StateId>,
        configure: impl FnOnce(StateBuilder<C, P>) -> StateBuilder<C, P>,
    ) -> Self {
        let name = name.into();
        let built = configure(StateBuilder { def: StateDef::new(name.clone()) }).def;
        self.states.insert(name, built);
        self
    }

    pub fn build(self) -> Result<FsmDefinition<C, P>, FsmBuildError> {
        if self.states.is_empty() {
            return Err(FsmBuildError::NoStates);
        }
        let initial = self.initial.ok_or(FsmBuildError::NoInitialState)?;
        if !self.states.contains_key(&initial) {
            return Err(FsmBuildError::UnknownInitialState(initial));
        }
        for state in self.states.values() {
            for t in &state.transitions {
                if !self.states.contains_key(&t.target) {
                    return Err(FsmBuildError::DanglingTransition {
                        from: state.name.clone(),
                        event: t.event.clone(),
                        to: t.target.clone(),
                    });
                }
            }
            if let Some(timeout) = &state.timeout {
                if !self.states.contains_key(&timeout.target) {
                    return Err(FsmBuildError::DanglingTimeout {
                        from: state.name.clone(),
                        to: timeout.target.clone(),
                    });
                }
            }
        }
        Ok(FsmDefinition { states: self.states, initial })
    }
}

impl<C, P> Default for FsmBuilder<C, P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Nested builder for one state's hooks, transitions and stay actions.
pub struct StateBuilder<C, P> {
    def: StateDef<C, P>,
}

impl<C, P> StateBuilder<C, P> {
    /// Register a fallible entry hook, given the event that caused the
    /// machine to enter this state (the triggering event for a normal
    /// transition, or the creation event for the initial state). A
    /// failing hook aborts the `fire` call that triggered it (see
    /// [`crate::instance::FsmInstance::fire`]).
    pub fn on_entry(
        mut self,
        f: impl Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.def.on_entry = Some(Box::new(f));
        self
    }

    /// Register a fallible exit hook, given the event that triggered the
    /// transition out of this state. A failing hook aborts the `fire`
    /// call that triggered it (see [`crate::instance::FsmInstance::fire`]).
    pub fn on_exit(
        mut self,
        f: impl Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.def.on_exit = Some(Box::new(f));
        self
    }

    pub fn final_state(mut self) -> Self {
        self.def.is_final = true;
        self
    }

    /// Mark this state offline: the registry saves and evicts the
    /// machine immediately after entering it (§4.2).
    pub fn offline(mut self) -> Self {
        self.def.is_offline = true;
        self
    }

    /// Declare a deadline: fire a synthetic timeout event after
    /// `duration` if the machine has not left this state, landing on
    /// `target`.
    pub fn timeout(mut self, duration: std::time::Duration, target: impl Into<StateId>) -> Self {
        self.def.timeout = Some(StateTimeout { duration, target: target.into() });
        self
    }

    pub fn max_visits(mut self, n: u32) -> Self {
        self.def.max_visits = Some(n);
        self
    }

    /// Declare a guarded transition on `event`, configured via a nested
    /// [`TransitionBuilder`] that must call `.goto(..)`.
    pub fn transition(
        mut self,
        event: impl Into<EventKind>,
        configure: impl FnOnce(TransitionBuilder<C, P>) -> TransitionBuilder<C, P>,
    ) -> Self {
        let tb = configure(TransitionBuilder {
            event: event.into(),
            guard: None,
            target: None,
            action: None,
        });
        if let Some(target) = tb.target {
            self.def.transitions.push(Transition {
                event: tb.event,
                guard: tb.guard,
                target,
                action: tb.action,
            });
        }
        self
    }

    /// Declare a stay action on `event`: the event is consumed, the
    /// current state is kept, entry/exit hooks do not run.
    pub fn stay(
        mut self,
        event: impl Into<EventKind>,
        action: impl Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.def.stay_actions.push(StayAction {
            event: event.into(),
            guard: None,
            action: Box::new(action),
        });
        self
    }

    /// Declare a guarded stay action.
    pub fn stay_guarded(
        mut self,
        event: impl Into<EventKind>,
        guard: impl Fn(&C, &Event<P>) -> bool + Send + Sync + 'static,
        action: impl Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.def.stay_actions.push(StayAction {
            event: event.into(),
            guard: Some(Box::new(guard)),
            action: Box::new(action),
        });
        self
    }
}

/// Nested builder for one transition. `.goto(..)` is mandatory; a
/// transition built without it is silently dropped by the enclosing
/// [`StateBuilder::transition`] — authors are expected to always call it.
pub struct TransitionBuilder<C, P> {
    event: EventKind,
    guard: Option<Guard<C, P>>,
    target: Option<StateId>,
    action: Option<Action<C, P>>,
}

impl<C, P> TransitionBuilder<C, P> {
    pub fn guard(mut self, f: impl Fn(&C, &Event<P>) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Box::new(f));
        self
    }

    pub fn goto(mut self, target: impl Into<StateId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn action(
        mut self,
        f: impl Fn(&mut C, &Event<P>) -> Result<(), ActionError> + Send + Sync + 'static,
    ) -> Self {
        self.action = Some(Box::new(f));
        self
    }
}
