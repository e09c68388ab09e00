// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table identifiers are never passed through as bind parameters — MySQL
//! doesn't support parameterized identifiers — so every name interpolated
//! into a query (root table, partition table, entity table) is validated
//! against this allowlist first. Partition and table names only ever come
//! from [`machina_storage::GraphSchema`] and the deterministic partition
//! naming helpers, never from request payloads, but a rogue schema
//! configuration should fail loudly rather than build an injectable query.

use machina_storage::StorageError;

pub fn validate_identifier(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::backend(InvalidIdentifier(name.to_string())))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0:?} is not a valid SQL identifier")]
struct InvalidIdentifier(String);
