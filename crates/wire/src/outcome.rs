// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The wire shape of `fire`'s result (§6): every outcome a caller outside
//! the registry's own process needs to distinguish.

use serde::{Deserialize, Serialize};

/// Serializable counterpart to `machina_registry`'s own fire outcome type.
/// Carries only what an external caller needs — state names as plain
/// strings, never the engine's internal `StateId` newtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FireOutcome {
    Accepted { from: String, to: String },
    StayApplied { state: String },
    Ignored,
    Throttled,
    CapacityExceeded,
    Shutdown,
    Failed { reason: String },
}
