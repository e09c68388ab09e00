// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state-machine snapshot row (§6): the part of a machine's persisted
//! state that exists regardless of whether it has a child graph at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical schema of the root row persisted for every machine.
///
/// `entity_data` is the serialized persistent context — the whole root,
/// including its annotated children (see [`machina_core::GraphNode`])
/// but with transient fields at their `#[serde(skip)]` defaults — and is
/// the source of truth on load whenever a column-level schema isn't
/// available to reattach children from (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: String,
    pub current_state: String,
    pub last_state_change: DateTime<Utc>,
    pub complete: bool,
    /// Partition key for time-based strategies; also the row's own
    /// creation timestamp, immutable after the first save.
    pub created_at: DateTime<Utc>,
    pub entity_data: serde_json::Value,
}

impl SnapshotRow {
    pub fn new(
        id: impl Into<String>,
        current_state: impl Into<String>,
        last_state_change: DateTime<Utc>,
        complete: bool,
        created_at: DateTime<Utc>,
        entity_data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            current_state: current_state.into(),
            last_state_change,
            complete,
            created_at,
            entity_data,
        }
    }
}
