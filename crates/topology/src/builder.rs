// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turns a parsed [`TopologyDoc`] plus an [`ActionRegistry`] into a live
//! `FsmDefinition`, resolving every named hook/guard/action up front so the
//! only failure mode once `machina_engine::FsmBuilder::state` starts being
//! called is a dangling reference the engine itself rejects.

use machina_engine::FsmDefinition;

use crate::duration::parse_duration;
use crate::error::TopologyError;
use crate::hooks::{require_action, require_guard, require_hook, ActionRegistry};
use crate::spec::TopologyDoc;

pub fn build_definition<C, P>(
    doc: &TopologyDoc,
    registry: &ActionRegistry<C, P>,
) -> Result<FsmDefinition<C, P>, TopologyError>
where
    C: 'static,
    P: 'static,
{
    tracing::debug!(states = doc.states.len(), initial = %doc.initial, "building fsm definition from topology");
    let mut builder = FsmDefinition::<C, P>::builder().initial(doc.initial.clone());

    for (state_name, spec) in &doc.states {
        let entry_hook = match &spec.on_entry {
            Some(name) => Some(require_hook(registry, state_name, name)?),
            None => None,
        };
        let exit_hook = match &spec.on_exit {
            Some(name) => Some(require_hook(registry, state_name, name)?),
            None => None,
        };
        let timeout = match &spec.timeout {
            Some(t) => Some((parse_duration(&t.after)?, t.target.clone())),
            None => None,
        };

        let mut transitions = Vec::with_capacity(spec.transitions.len());
        for (event_name, t) in &spec.transitions {
            let guard = match &t.guard {
                Some(name) => Some(require_guard(registry, state_name, event_name, name)?),
                None => None,
            };
            let action = match &t.action {
                Some(name) => Some(require_action(registry, state_name, event_name, name)?),
                None => None,
            };
            transitions.push((event_name.clone(), t.target.clone(), guard, action));
        }

        let mut stays = Vec::with_capacity(spec.stays.len());
        for (event_name, s) in &spec.stays {
            let guard = match &s.guard {
                Some(name) => Some(require_guard(registry, state_name, event_name, name)?),
                None => None,
            };
            let action = require_action(registry, state_name, event_name, &s.action)?;
            stays.push((event_name.clone(), guard, action));
        }

        let is_final = spec.is_final;
        let is_offline = spec.offline;
        let max_visits = spec.max_visits;

        builder = builder.state(state_name.clone(), move |mut s| {
            if is_final {
                s = s.final_state();
            }
            if is_offline {
                s = s.offline();
            }
            if let Some(n) = max_visits {
                s = s.max_visits(n);
            }
            if let Some(hook) = entry_hook {
                s = s.on_entry(move |ctx, ev| hook.call(ctx, ev));
            }
            if let Some(hook) = exit_hook {
                s = s.on_exit(move |ctx, ev| hook.call(ctx, ev));
            }
            if let Some((duration, target)) = timeout {
                s = s.timeout(duration, target);
            }
            for (event, target, guard, action) in transitions {
                s = s.transition(event, move |mut tb| {
                    if let Some(g) = guard {
                        tb = tb.guard(move |ctx, ev| g.check(ctx, ev));
                    }
                    if let Some(a) = action {
                        tb = tb.action(move |ctx, ev| a.run(ctx, ev));
                    }
                    tb.goto(target)
                });
            }
            for (event, guard, action) in stays {
                s = match guard {
                    Some(g) => s.stay_guarded(
                        event,
                        move |ctx, ev| g.check(ctx, ev),
                        move |ctx, ev| action.run(ctx, ev),
                    ),
                    None => s.stay(event, move |ctx, ev| action.run(ctx, ev)),
                };
            }
            s
        });
    }

    let definition = builder.build().map_err(TopologyError::from)?;
    tracing::info!("fsm definition built from topology");
    Ok(definition)
}
