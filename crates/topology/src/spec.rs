// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The parsed shape of a topology document, independent of any particular
//! context/payload type. Deserialized straight off HCL text the same way
//! `machina-topology`'s sibling crates deserialize their own declarative
//! configs: plain `serde::Deserialize` derives, with labeled blocks
//! (`state "x" { ... }`) landing in an `IndexMap` keyed by label.
//!
//! [`crate::build_definition`] turns this plus an [`crate::ActionRegistry`]
//! into a live `FsmDefinition`.

use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyDoc {
    pub initial: String,
    #[serde(default, rename = "state")]
    pub states: IndexMap<String, StateSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateSpec {
    #[serde(default)]
    pub on_entry: Option<String>,
    #[serde(default)]
    pub on_exit: Option<String>,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub max_visits: Option<u32>,
    #[serde(default)]
    pub timeout: Option<TimeoutSpec>,
    #[serde(default, rename = "transition")]
    pub transitions: IndexMap<String, TransitionSpec>,
    #[serde(default, rename = "stay")]
    pub stays: IndexMap<String, StaySpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionSpec {
    pub target: String,
    #[serde(default)]
    pub guard: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaySpec {
    pub action: String,
    #[serde(default)]
    pub guard: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSpec {
    pub after: String,
    pub target: String,
}
