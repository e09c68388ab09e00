// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistence provider contract (§4.4): uniform save/load/delete over
//! a machine id, plus the selective multi-entity graph variant.

use crate::error::StorageError;
use crate::snapshot::SnapshotRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use machina_core::{EntityRole, LoadedChild};

/// One child row already routed to a physical table/partition, ready for
/// a backend to upsert.
#[derive(Debug, Clone)]
pub struct RoutedRow {
    pub table: String,
    pub partition: String,
    pub role: EntityRole,
    /// Back-reference to the owning machine id (§4.4 step 4: "each
    /// carrying the root id as a back-reference column").
    pub root_id: String,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub created_at: DateTime<Utc>,
    pub value: serde_json::Value,
}

/// Everything one `save` call needs: the root snapshot, its own routed
/// table/partition, and every routed child row. Constructed by
/// [`crate::graph::route_for_save`] — callers never build one by hand.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub snapshot: SnapshotRow,
    pub snapshot_table: String,
    pub snapshot_partition: String,
    pub children: Vec<RoutedRow>,
}

/// What `load` returns: the root row plus whatever per-entity-type rows
/// were queried back for reattachment (§4.4 step 3). Empty `children`
/// just means the caller's [`machina_core::GraphHydrate::apply_loaded_children`]
/// runs with nothing to apply — reconstruction still proceeds from
/// `snapshot.entity_data`.
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    pub snapshot: SnapshotRow,
    pub children: Vec<LoadedChild>,
}

/// Uniform save/load/delete over a machine id (§4.4).
///
/// Save and load are atomic from the caller's viewpoint: a partial graph
/// is never visible. Concrete backends live in `machina-adapters`; this
/// crate only defines the contract and the routing logic in front of it.
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    /// Provision whatever the backend needs before first use (e.g. the
    /// root table and its initial forward partitions).
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Upsert the root row and every routed child row, grouped by target
    /// table (§4.4 step 6: "one batch per table"). A missing partition is
    /// created first when its [`crate::schema::EntitySchema::auto_create`]
    /// (or the provider's own default) is set.
    async fn save(&self, request: SaveRequest) -> Result<(), StorageError>;

    /// Batch save: group by target table across every request before
    /// issuing writes. The default implementation just calls [`save`]
    /// once per request; backends that can batch natively should override
    /// it.
    ///
    /// [`save`]: PersistenceProvider::save
    async fn save_batch(&self, requests: Vec<SaveRequest>) -> Result<(), StorageError> {
        for request in requests {
            self.save(request).await?;
        }
        Ok(())
    }

    /// Load the root row (and, if the backend supports it, per-entity-type
    /// child rows) by id. `None` if the id has never been saved.
    async fn load(&self, id: &str) -> Result<Option<LoadedGraph>, StorageError>;

    async fn exists(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.load(id).await?.is_some())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Drop partitions whose data is entirely older than `cutoff`,
    /// returning the names of the partitions/tables dropped. Never drops
    /// the active month/range. The default no-ops for backends with no
    /// maintenance story (e.g. HASH/KEY).
    async fn delete_partitions_older_than(
        &self,
        _cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
}
