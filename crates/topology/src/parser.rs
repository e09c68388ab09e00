// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parses a topology document from HCL text.

use crate::error::TopologyError;
use crate::spec::TopologyDoc;

pub fn parse(input: &str) -> Result<TopologyDoc, TopologyError> {
    let doc: TopologyDoc = hcl::from_str(input).map_err(|e| {
        tracing::warn!(error = %e, "topology parse failed");
        TopologyError::Parse(e.to_string())
    })?;
    tracing::debug!(states = doc.states.len(), initial = %doc.initial, "topology parsed");
    Ok(doc)
}
