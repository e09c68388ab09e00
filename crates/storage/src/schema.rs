// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compile-time-computed routing metadata for the multi-entity graph.
//!
//! This is the "reflection-driven field walking... becomes compile-time
//! metadata" redesign flag (spec §9) applied to persistence: rather than
//! inspecting a context's shape at save time, an [`GraphSchema`] is built
//! once (typically alongside the owning [`machina_engine::FsmDefinition`])
//! and maps each [`machina_core::ShardingEntity::entity_type`] string to
//! the table and partitioning strategy its rows route to. The runtime
//! save/load path only ever does a schema lookup keyed by that string,
//! never a type-shape probe.

use crate::partition::PartitionStrategy;
use std::collections::HashMap;

/// Per-entity-type routing: which base table, and how it's partitioned.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub table_base: String,
    pub strategy: PartitionStrategy,
    /// Whether a missing partition is created on first use. Mirrors the
    /// provider-level `autoCreate` flag from §4.4 but can be overridden
    /// per entity type (e.g. a high-cardinality HASH/KEY table wants all
    /// buckets provisioned up front instead).
    pub auto_create: bool,
}

/// Routing table for one machine type's multi-entity graph, plus the
/// root snapshot row's own partitioning.
#[derive(Debug, Clone)]
pub struct GraphSchema {
    pub root_table: String,
    pub root_strategy: PartitionStrategy,
    entities: HashMap<&'static str, EntitySchema>,
}

impl GraphSchema {
    pub fn builder(root_table: impl Into<String>, root_strategy: PartitionStrategy) -> GraphSchemaBuilder {
        GraphSchemaBuilder {
            root_table: root_table.into(),
            root_strategy,
            entities: HashMap::new(),
        }
    }

    pub fn entity_schema(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.entities.get(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entities.keys().copied()
    }
}

pub struct GraphSchemaBuilder {
    root_table: String,
    root_strategy: PartitionStrategy,
    entities: HashMap<&'static str, EntitySchema>,
}

impl GraphSchemaBuilder {
    /// Register routing for an annotated entity type. Anything reachable
    /// from the root's [`machina_core::GraphNode::visit_children`] whose
    /// `entity_type()` has no entry here is a programmer error (a
    /// declared child with nowhere to route) rather than silently
    /// dropped — `GraphSchema` is meant to be exhaustive for one machine
    /// type's graph.
    pub fn entity(
        mut self,
        entity_type: &'static str,
        table_base: impl Into<String>,
        strategy: PartitionStrategy,
    ) -> Self {
        self.entities.insert(
            entity_type,
            EntitySchema { table_base: table_base.into(), strategy, auto_create: true },
        );
        self
    }

    pub fn entity_no_auto_create(
        mut self,
        entity_type: &'static str,
        table_base: impl Into<String>,
        strategy: PartitionStrategy,
    ) -> Self {
        self.entities.insert(
            entity_type,
            EntitySchema { table_base: table_base.into(), strategy, auto_create: false },
        );
        self
    }

    pub fn build(self) -> GraphSchema {
        GraphSchema {
            root_table: self.root_table,
            root_strategy: self.root_strategy,
            entities: self.entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_entity_type_has_no_route() {
        let schema = GraphSchema::builder("calls", PartitionStrategy::monthly())
            .entity("customer", "customers", PartitionStrategy::monthly())
            .build();
        assert!(schema.entity_schema("customer").is_some());
        assert!(schema.entity_schema("analytics").is_none());
    }
}
