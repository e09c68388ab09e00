// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability interfaces for the multi-entity graph rooted at a machine's
//! persistent context.
//!
//! There is no reflection here: a root context opts into selective graph
//! persistence by implementing [`GraphNode::visit_children`] itself, handing
//! each child to the visitor along with its [`EntityRole`]. The persistence
//! layer never inspects struct fields by name or type id.

use std::time::SystemTime;

/// A child entity eligible for selective persistence.
///
/// Anything with a stable id and a creation timestamp can be a graph child;
/// the two fields are exactly what a partitioned upsert needs to route and
/// key a row.
pub trait ShardingEntity: Send + Sync {
    fn entity_id(&self) -> &str;
    fn created_at(&self) -> SystemTime;

    /// Logical entity type, stable across releases. Used to resolve which
    /// partitioned table (and partitioning strategy) this entity routes to.
    fn entity_type(&self) -> &'static str;

    /// The entity serialized to its row payload.
    fn to_row_value(&self) -> serde_json::Value;
}

/// How a child entity participates in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRole {
    /// An ordinary child: every instance reachable from the root is
    /// persisted, keyed by its own id.
    Entity,
    /// At most one logical instance per graph traversal. If the same
    /// singleton (by `entity_type` + `entity_id`) is reachable from more
    /// than one place in the graph, it is written once. Singleton scope is
    /// intra-graph: the same entity id used by a *different* machine's
    /// graph is an unrelated row.
    Singleton,
}

/// Callback sink fed by [`GraphNode::visit_children`] during a save.
pub trait GraphVisitor {
    fn visit(&mut self, role: EntityRole, entity: &dyn ShardingEntity);
}

/// Implemented by a root persistent context (and, recursively, by any
/// child that itself has children) to enumerate the entities reachable
/// from it.
///
/// The default implementation declares no children, so a simple root
/// context with no child entities needs no implementation at all.
pub trait GraphNode {
    fn visit_children(&self, visitor: &mut dyn GraphVisitor) {
        let _ = visitor;
    }
}

/// One child row as it comes back from a partitioned query during the
/// graph read algorithm (§4.4 step 3: "reattach annotated children in one
/// query each").
#[derive(Debug, Clone)]
pub struct LoadedChild {
    /// The root machine id this child was written under (§3 invariant 3:
    /// "all persisted child entities of a machine share the root's id").
    pub root_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub created_at: SystemTime,
    pub value: serde_json::Value,
}

/// The read-side counterpart to [`GraphNode`]: reattach previously-saved
/// children onto a freshly constructed root.
///
/// `machina-storage`'s graph read path always has the root's
/// `entity_data` blob available and falls back to reconstructing purely
/// from it (the spec's "source of truth ... when a column schema is
/// unavailable") — this trait is for the common case where per-entity-type
/// partitioned rows were also queried and should take precedence over
/// whatever the blob carries for the same fields, since those rows are
/// the ones external, non-FSM systems query directly. The default
/// implementation reattaches nothing, which is correct for a root with no
/// annotated children.
pub trait GraphHydrate {
    fn apply_loaded_children(&mut self, rows: &[LoadedChild]) {
        let _ = rows;
    }
}

/// Walk a root's graph, collecting every reachable entity with its role,
/// honoring singleton dedup (same `entity_type` + `entity_id` reached more
/// than once counts once) and therefore also cycle avoidance, since a
/// cycle revisits the same identity.
///
/// This is the shared algorithm `machina-storage`'s graph-save path drives;
/// it lives here so both the storage crate and tests can exercise it
/// without depending on a concrete provider.
pub fn collect_graph<'a, R: GraphNode>(root: &'a R) -> Vec<(EntityRole, Box<dyn ShardingEntity + 'a>)>
where
    R: 'a,
{
    struct Collector<'a> {
        out: Vec<(EntityRole, Box<dyn ShardingEntity + 'a>)>,
        seen: std::collections::HashSet<(&'static str, String)>,
    }

    // A visitor can only hand us borrowed `&dyn ShardingEntity` references,
    // whose concrete lifetime is tied to the root; we re-box a thin proxy
    // so the collected list can outlive the visitor callback itself.
    struct Proxy<'a> {
        entity_type: &'static str,
        entity_id: String,
        created_at: SystemTime,
        row: serde_json::Value,
        _marker: std::marker::PhantomData<&'a ()>,
    }

    impl ShardingEntity for Proxy<'_> {
        fn entity_id(&self) -> &str {
            &self.entity_id
        }
        fn created_at(&self) -> SystemTime {
            self.created_at
        }
        fn entity_type(&self) -> &'static str {
            self.entity_type
        }
        fn to_row_value(&self) -> serde_json::Value {
            self.row.clone()
        }
    }

    impl<'a> GraphVisitor for Collector<'a> {
        fn visit(&mut self, role: EntityRole, entity: &dyn ShardingEntity) {
            let key = (entity.entity_type(), entity.entity_id().to_string());
            if role == EntityRole::Singleton && self.seen.contains(&key) {
                return;
            }
            self.seen.insert(key);
            self.out.push((
                role,
                Box::new(Proxy {
                    entity_type: entity.entity_type(),
                    entity_id: entity.entity_id().to_string(),
                    created_at: entity.created_at(),
                    row: entity.to_row_value(),
                    _marker: std::marker::PhantomData,
                }),
            ));
        }
    }

    let mut collector = Collector {
        out: Vec::new(),
        seen: std::collections::HashSet::new(),
    };
    root.visit_children(&mut collector);
    collector.out
}
