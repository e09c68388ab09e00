// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failures building an [`machina_engine::FsmDefinition`] from a declarative
//! HCL topology.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to parse topology document: {0}")]
    Parse(String),

    #[error("state {0:?} references on_entry/on_exit hook {1:?}, which was never registered")]
    UnknownHook(String, String),

    #[error("state {0:?} transition {1:?} references guard {2:?}, which was never registered")]
    UnknownGuard(String, String, String),

    #[error("state {0:?} transition {1:?} references action {2:?}, which was never registered")]
    UnknownAction(String, String, String),

    #[error("invalid timeout duration {0:?}: expected a number followed by ms/s/m/h")]
    InvalidDuration(String),

    #[error(transparent)]
    Build(#[from] machina_engine::FsmBuildError),
}
