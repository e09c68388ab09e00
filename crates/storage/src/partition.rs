// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partitioning strategies and deterministic partition naming (§4.4, §6).

use chrono::{DateTime, Datelike, Utc};

/// How a logical table is split across physical partitions.
///
/// Chosen once per entity type at [`crate::schema::GraphSchema`]
/// construction; never reconfigured at runtime (§1 Non-goals: "dynamic
/// reconfiguration of FSM topology at runtime" extends to the storage
/// topology built alongside it).
#[derive(Debug, Clone)]
pub enum PartitionStrategy {
    /// Physical table per month: `<base>_YYYY_MM`. The date of write
    /// determines the target table.
    Monthly,
    /// Single table, partitioned by date range at the store level.
    /// `forward_partitions` are pre-provisioned ahead of the current
    /// month; `retention` bounds how far back maintenance keeps partitions.
    Range { forward_partitions: u32, retention: Option<chrono::Duration> },
    /// Single table, partitioned by an explicit key column into `buckets`
    /// physical partitions, numbered `p0..pN-1`.
    HashKey { buckets: u32 },
}

impl PartitionStrategy {
    pub fn monthly() -> Self {
        Self::Monthly
    }

    pub fn range(forward_partitions: u32, retention: Option<chrono::Duration>) -> Self {
        Self::Range { forward_partitions, retention }
    }

    pub fn hash_key(buckets: u32) -> Self {
        Self::HashKey { buckets }
    }
}

/// Where one row's `created_at` (and, for `HashKey`, its explicit
/// `partition_key`) routes it, as a physical partition identifier.
///
/// For `Monthly` this is a real table name; for `Range`/`HashKey` it
/// names a declared partition within the single base table; callers that
/// need the *table* to query still use `base` directly and treat the
/// partition name only as a routing/maintenance detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionName(pub String);

impl std::fmt::Display for PartitionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Route `created_at` (and, for `HashKey`, `partition_key`) to a
/// deterministic partition name under `base`, per §6's naming rules.
pub fn partition_name(
    strategy: &PartitionStrategy,
    base: &str,
    created_at: DateTime<Utc>,
    partition_key: Option<&str>,
) -> PartitionName {
    match strategy {
        PartitionStrategy::Monthly => {
            PartitionName(format!("{base}_{:04}_{:02}", created_at.year(), created_at.month()))
        }
        PartitionStrategy::Range { .. } => {
            PartitionName(format!("p{:04}{:02}", created_at.year(), created_at.month()))
        }
        PartitionStrategy::HashKey { buckets } => {
            let key = partition_key.unwrap_or_default();
            let bucket = hash_bucket(key, *buckets);
            PartitionName(format!("p{bucket}"))
        }
    }
}

/// `p_history`: the RANGE strategy's catch-all partition for rows older
/// than every declared range (§6).
pub fn range_history_partition() -> PartitionName {
    PartitionName("p_history".to_string())
}

/// The first `forward_partitions` monthly ranges `[first(Y-M),
/// first(Y-M+1))` that should exist ahead of `from`, for a RANGE strategy
/// provider to pre-provision.
pub fn forward_range_partitions(from: DateTime<Utc>, forward_partitions: u32) -> Vec<PartitionName> {
    (0..forward_partitions)
        .map(|offset| {
            let target = add_months(from, offset as i32);
            PartitionName(format!("p{:04}{:02}", target.year(), target.month()))
        })
        .collect()
}

/// Whether `created_at` falls within `[first(Y-M), first(Y-M+1))` for the
/// given month, i.e. the RANGE routing check from the testable properties
/// ("no row is visible from a partition it does not belong to").
pub fn in_month_range(created_at: DateTime<Utc>, year: i32, month: u32) -> bool {
    let start = first_of_month(year, month);
    let end = add_months(start, 1);
    created_at >= start && created_at < end
}

fn add_months(from: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let total = from.year() * 12 + (from.month() as i32 - 1) + months;
    let year = total.div_euclid(12);
    let month = (total.rem_euclid(12)) as u32 + 1;
    first_of_month(year, month)
}

/// Normalizes `month` into `1..=12` by carrying the excess into `year`
/// first, so this never has to fall back to a different month than the
/// one it was asked for.
fn first_of_month(year: i32, month: u32) -> DateTime<Utc> {
    use chrono::TimeZone;
    let month0 = month.saturating_sub(1);
    let year = year + (month0 / 12) as i32;
    let month = month0 % 12 + 1;
    match Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => DateTime::<Utc>::default(),
    }
}

fn hash_bucket(key: &str, buckets: u32) -> u32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % buckets.max(1) as u64) as u32
}

/// Month key (`cutoff`'s year/month) below which a MONTHLY-strategy
/// maintenance pass drops physical tables. Never includes the active
/// month regardless of `cutoff` (§4.4: "maintenance never touches the
/// active month").
pub fn monthly_tables_older_than(existing: &[String], base: &str, cutoff: DateTime<Utc>) -> Vec<String> {
    let cutoff_key = (cutoff.year(), cutoff.month());
    let active_key = {
        let now = cutoff; // caller passes "now" as cutoff's reference frame is irrelevant here
        (now.year(), now.month())
    };
    let dropped: Vec<String> = existing
        .iter()
        .filter_map(|name| {
            let suffix = name.strip_prefix(&format!("{base}_"))?;
            let mut parts = suffix.splitn(2, '_');
            let year: i32 = parts.next()?.parse().ok()?;
            let month: u32 = parts.next()?.parse().ok()?;
            if (year, month) < cutoff_key && (year, month) != active_key {
                Some(name.clone())
            } else {
                None
            }
        })
        .collect();
    tracing::debug!(base, count = dropped.len(), "monthly partitions eligible for maintenance drop");
    dropped
}
