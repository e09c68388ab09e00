// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Failures from a [`crate::provider::PersistenceProvider`] backend or
/// from the graph routing logic in front of it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no route registered for entity type {entity_type:?}")]
    UnroutedEntityType { entity_type: String },

    #[error("partition {partition} for table {table} does not exist and auto-create is disabled")]
    MissingPartition { table: String, partition: String },

    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to (de)serialize persistent context: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StorageError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}
