// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! machina-topology: builds a `machina_engine::FsmDefinition` from a
//! declarative HCL document instead of a hand-written `FsmBuilder` chain.
//!
//! HCL describes graph *shape* -- states, transitions, timeouts, which
//! states are final or offline. Guards and actions are Rust closures with
//! real side effects, so a document can only name them; [`ActionRegistry`]
//! is where the application root binds those names to code before calling
//! [`build_definition`].

mod builder;
mod duration;
mod error;
mod hooks;
mod parser;
mod spec;

pub use builder::build_definition;
pub use duration::parse_duration;
pub use error::TopologyError;
pub use hooks::{ActionRegistry, EntryHook, NamedAction, NamedGuard};
pub use parser::parse;
pub use spec::{StateSpec, StaySpec, TimeoutSpec, TopologyDoc, TransitionSpec};

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone)]
    struct CallContext {
        answered: bool,
        held: bool,
    }

    const TOPOLOGY: &str = r#"
        initial = "ringing"

        state "ringing" {
          transition "answer" {
            guard  = "always"
            action = "mark_answered"
            target = "active"
          }

          timeout {
            after  = "30s"
            target = "missed"
          }
        }

        state "active" {
          stay "hold" {
            action = "apply_hold"
          }

          transition "hangup" {
            target = "completed"
          }
        }

        state "completed" {
          final = true
        }

        state "missed" {
          offline = true
        }
    "#;

    #[test]
    fn builds_a_definition_from_hcl_and_a_named_registry() {
        let doc = parse(TOPOLOGY).expect("valid topology");

        let registry: ActionRegistry<CallContext, ()> = ActionRegistry::new()
            .guard("always", |_ctx: &CallContext, _ev| true)
            .action("mark_answered", |ctx: &mut CallContext, _ev| {
                ctx.answered = true;
                Ok(())
            })
            .action("apply_hold", |ctx: &mut CallContext, _ev| {
                ctx.held = true;
                Ok(())
            });

        let definition = build_definition(&doc, &registry).expect("valid definition");
        assert_eq!(definition.initial_state().as_str(), "ringing");
        assert!(definition
            .state(&machina_core::StateId::new("completed"))
            .unwrap()
            .is_final());
        assert!(definition
            .state(&machina_core::StateId::new("missed"))
            .unwrap()
            .is_offline());
    }

    #[test]
    fn unregistered_guard_is_reported_with_its_state_and_transition() {
        let doc = parse(TOPOLOGY).expect("valid topology");
        let registry: ActionRegistry<CallContext, ()> = ActionRegistry::new();
        let result = build_definition(&doc, &registry);
        assert!(matches!(result, Err(TopologyError::UnknownGuard(state, event, name))
            if state == "ringing" && event == "answer" && name == "always"));
    }
}
