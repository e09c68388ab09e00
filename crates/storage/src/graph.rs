// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrates [`machina_core::collect_graph`] against a [`GraphSchema`]
//! to build the routed [`SaveRequest`] a [`PersistenceProvider`] upserts,
//! and the reverse: turning a [`LoadedGraph`] back into a typed root.
//!
//! Neither direction touches a real backend — this is the pure routing
//! and (de)serialization logic the testable properties in the spec ("K
//! annotated entities -> K rows written", "partition routing") exercise
//! without any I/O.

use crate::error::StorageError;
use crate::provider::{LoadedGraph, RoutedRow, SaveRequest};
use crate::schema::GraphSchema;
use crate::snapshot::SnapshotRow;
use chrono::{DateTime, Utc};
use machina_core::{collect_graph, GraphHydrate, GraphNode, PersistentContext};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Walk `root`'s graph, route every annotated child through `schema`, and
/// produce the [`SaveRequest`] a provider can upsert in one shot.
///
/// `root` must be `Serialize` so its `entity_data` blob — the source of
/// truth on load when column-level reattachment isn't available — can be
/// captured alongside the routed child rows.
pub fn route_for_save<R>(root: &R, schema: &GraphSchema, now: DateTime<Utc>) -> Result<SaveRequest, StorageError>
where
    R: PersistentContext + GraphNode + Serialize,
{
    let entity_data = serde_json::to_value(root)?;
    let created_at = now;
    let snapshot = SnapshotRow::new(
        root.id(),
        root.current_state().as_str(),
        system_time_to_utc(root.last_state_change()),
        root.is_complete(),
        created_at,
        entity_data,
    );

    let snapshot_partition =
        crate::partition::partition_name(&schema.root_strategy, &schema.root_table, created_at, None);

    let mut children = Vec::new();
    for (role, entity) in collect_graph(root) {
        let entity_type = entity.entity_type();
        let entity_schema = schema
            .entity_schema(entity_type)
            .ok_or_else(|| StorageError::UnroutedEntityType { entity_type: entity_type.to_string() })?;
        let entity_created_at = system_time_to_utc(entity.created_at());
        let partition = crate::partition::partition_name(
            &entity_schema.strategy,
            &entity_schema.table_base,
            entity_created_at,
            Some(entity.entity_id()),
        );
        children.push(RoutedRow {
            table: entity_schema.table_base.clone(),
            partition: partition.0,
            role,
            root_id: root.id().to_string(),
            entity_type,
            entity_id: entity.entity_id().to_string(),
            created_at: entity_created_at,
            value: entity.to_row_value(),
        });
    }

    tracing::trace!(
        root_id = root.id(),
        children = children.len(),
        partition = %snapshot_partition,
        "routed graph for save"
    );

    Ok(SaveRequest {
        snapshot,
        snapshot_table: schema.root_table.clone(),
        snapshot_partition: snapshot_partition.0,
        children,
    })
}

/// Reconstruct a typed root from what [`PersistenceProvider::load`]
/// returned: deserialize `entity_data` (covering every field, annotated
/// children included, transient fields at their `#[serde(skip)]`
/// defaults), then let any queried child rows override what the blob
/// carried via [`GraphHydrate::apply_loaded_children`].
pub fn hydrate<R>(loaded: LoadedGraph) -> Result<R, StorageError>
where
    R: DeserializeOwned + GraphHydrate,
{
    let mut root: R = serde_json::from_value(loaded.snapshot.entity_data)?;
    tracing::trace!(children = loaded.children.len(), "hydrating from blob plus loaded children");
    root.apply_loaded_children(&loaded.children);
    Ok(root)
}

fn system_time_to_utc(t: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}
