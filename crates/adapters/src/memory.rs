// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory [`PersistenceProvider`], the non-SQL embedding the
//! selective-persistence tests drive directly — no backend process, no
//! network, deterministic.
//!
//! Grounded on the teacher's `test-support`-gated fake-adapter convention
//! (`oj-adapters::FakeAdapter`): a real implementation of the production
//! trait, not a mock, so the same save/load/selective-persistence
//! properties hold here as against `MySqlStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use machina_core::LoadedChild;
use machina_storage::{LoadedGraph, PersistenceProvider, RoutedRow, SaveRequest, SnapshotRow, StorageError};

/// Keyed by `(table, entity_id)` — partition is tracked alongside the row
/// for assertions but never used to reject a read, since there's no
/// physical partition boundary to enforce in memory.
type ChildKey = (String, String);

#[derive(Default)]
pub struct MemoryStore {
    snapshots: DashMap<String, SnapshotRow>,
    children: DashMap<ChildKey, RoutedRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/diagnostic helper: how many rows exist in `table` for `root_id`.
    pub fn child_row_count(&self, table: &str, root_id: &str) -> usize {
        self.children
            .iter()
            .filter(|entry| entry.key().0 == table && entry.value().root_id == root_id)
            .count()
    }

    /// Test/diagnostic helper: the partition name a row was routed to,
    /// used by partition-routing assertions.
    pub fn child_partition(&self, table: &str, entity_id: &str) -> Option<String> {
        self.children.get(&(table.to_string(), entity_id.to_string())).map(|r| r.partition.clone())
    }
}

#[async_trait]
impl PersistenceProvider for MemoryStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn save(&self, request: SaveRequest) -> Result<(), StorageError> {
        // Upsert by (id, created_at): non-key columns replaced on conflict.
        let id = request.snapshot.id.clone();
        self.snapshots.insert(id.clone(), request.snapshot);
        for child in request.children {
            let key = (child.table.clone(), child.entity_id.clone());
            if child.role == machina_core::EntityRole::Singleton {
                if self.children.contains_key(&key) {
                    continue;
                }
            }
            self.children.insert(key, child);
        }
        tracing::trace!(%id, "snapshot saved to memory store");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<LoadedGraph>, StorageError> {
        let Some(snapshot) = self.snapshots.get(id).map(|r| r.clone()) else {
            tracing::trace!(id, "load miss");
            return Ok(None);
        };
        let children = self
            .children
            .iter()
            .filter(|entry| entry.value().root_id == id)
            .map(|entry| {
                let row = entry.value();
                LoadedChild {
                    root_id: row.root_id.clone(),
                    entity_type: row.entity_type.to_string(),
                    entity_id: row.entity_id.clone(),
                    created_at: row.created_at.into(),
                    value: row.value.clone(),
                }
            })
            .collect();
        Ok(Some(LoadedGraph { snapshot, children }))
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.snapshots.remove(id);
        self.children.retain(|_, row| row.root_id != id);
        tracing::debug!(id, "entity deleted from memory store");
        Ok(())
    }

    async fn delete_partitions_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        let mut dropped = Vec::new();
        let stale: Vec<String> = self
            .snapshots
            .iter()
            .filter(|entry| entry.value().created_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        for id in stale {
            self.snapshots.remove(&id);
            self.children.retain(|_, row| row.root_id != id);
            dropped.push(id);
        }
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "dropped stale entities past retention cutoff");
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machina_core::{GraphNode, GraphVisitor, PersistentContext, ShardingEntity, StateId};
    use machina_storage::{route_for_save, GraphSchema, PartitionStrategy};
    use serde::{Deserialize, Serialize};
    use std::time::SystemTime;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Child {
        id: String,
        #[serde(skip, default = "SystemTime::now")]
        created_at: SystemTime,
    }

    impl ShardingEntity for Child {
        fn entity_id(&self) -> &str {
            &self.id
        }
        fn created_at(&self) -> SystemTime {
            self.created_at
        }
        fn entity_type(&self) -> &'static str {
            "child"
        }
        fn to_row_value(&self) -> serde_json::Value {
            serde_json::json!({ "id": self.id })
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Root {
        id: String,
        state: StateId,
        last_change: DateTime<Utc>,
        complete: bool,
        children: Vec<Child>,
    }

    impl PersistentContext for Root {
        fn id(&self) -> &str {
            &self.id
        }
        fn current_state(&self) -> &StateId {
            &self.state
        }
        fn set_current_state(&mut self, state: StateId) {
            self.state = state;
        }
        fn last_state_change(&self) -> SystemTime {
            self.last_change.into()
        }
        fn set_last_state_change(&mut self, at: SystemTime) {
            self.last_change = at.into();
        }
        fn is_complete(&self) -> bool {
            self.complete
        }
        fn set_complete(&mut self, complete: bool) {
            self.complete = complete;
        }
        fn deep_copy(&self) -> Self {
            self.clone()
        }
    }

    impl GraphNode for Root {
        fn visit_children(&self, visitor: &mut dyn GraphVisitor) {
            for c in &self.children {
                visitor.visit(machina_core::EntityRole::Entity, c);
            }
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips_snapshot_and_children() {
        let store = MemoryStore::new();
        let schema = GraphSchema::builder("machines", PartitionStrategy::monthly())
            .entity("child", "children", PartitionStrategy::monthly())
            .build();
        let root = Root {
            id: "m-1".into(),
            state: StateId::new("ringing"),
            last_change: Utc::now(),
            complete: false,
            children: vec![Child { id: "c-1".into(), created_at: SystemTime::now() }],
        };
        let request = route_for_save(&root, &schema, Utc::now()).unwrap();
        store.save(request).await.unwrap();

        let loaded = store.load("m-1").await.unwrap().expect("present");
        assert_eq!(loaded.snapshot.current_state, "ringing");
        assert_eq!(loaded.children.len(), 1);
        assert_eq!(store.child_row_count("children", "m-1"), 1);
    }

    #[tokio::test]
    async fn delete_removes_snapshot_and_children() {
        let store = MemoryStore::new();
        let schema = GraphSchema::builder("machines", PartitionStrategy::monthly())
            .entity("child", "children", PartitionStrategy::monthly())
            .build();
        let root = Root {
            id: "m-2".into(),
            state: StateId::new("idle"),
            last_change: Utc::now(),
            complete: false,
            children: vec![Child { id: "c-2".into(), created_at: SystemTime::now() }],
        };
        let request = route_for_save(&root, &schema, Utc::now()).unwrap();
        store.save(request).await.unwrap();
        store.delete("m-2").await.unwrap();

        assert!(store.load("m-2").await.unwrap().is_none());
        assert_eq!(store.child_row_count("children", "m-2"), 0);
    }
}
