// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-machine transition record (§6): emitted after every accepted
//! transition, in per-machine order, after the state is committed in
//! memory and before eviction for that event (§5 ordering guarantees).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub machine_id: String,
    pub event_type: String,
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
    pub is_offline: bool,
    pub is_final: bool,
    /// Present only when the registry is configured to attach a snapshot
    /// of the persistent context to each record — opt-in, since it can be
    /// large and most listeners only care about the state transition
    /// itself.
    pub persistent_context_snapshot: Option<serde_json::Value>,
}
