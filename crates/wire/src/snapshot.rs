// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistent snapshot row's logical schema (§6), as an external
//! consumer would see it over a query interface — independent of
//! `machina_storage::SnapshotRow`, which is shaped around what
//! `machina-adapters` backends actually read and write. Kept as a
//! separate type rather than re-exported so this crate never needs a
//! dependency on `machina-storage`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDto {
    pub id: String,
    pub current_state: String,
    pub last_state_change: DateTime<Utc>,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
    pub entity_data: serde_json::Value,
}
