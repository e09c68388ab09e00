// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The listener event taxonomy (§6): registry-level events, delivered
//! out-of-band to the documented-but-out-of-scope collaborators (TUI
//! dashboard, WebSocket tree-view broadcast) without pulling in
//! `machina-engine`/`machina-registry` internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListenerEventKind {
    MachineCreated,
    MachineRegistered,
    MachineRehydrated,
    MachineEvicted,
    MachineCreationRefused,
    MachineOffline,
    EventIgnored,
    RegistryTimeout,
    RegistryStartup,
    RegistryShutdown,
    PersistenceOperation,
    ConfigChange,
    Warning,
    Error,
}

/// One registry-level event as delivered to listeners (§6). `machine_id`
/// is absent for registry-wide events (startup/shutdown/config change).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerEvent {
    pub kind: ListenerEventKind,
    pub machine_id: Option<String>,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl ListenerEvent {
    pub fn new(kind: ListenerEventKind, at: DateTime<Utc>) -> Self {
        Self { kind, machine_id: None, message: None, at }
    }

    pub fn for_machine(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
