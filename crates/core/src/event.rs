// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed event a caller fires at a machine instance.

use smol_str::SmolStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// The name of an event, as declared on a transition or stay action.
///
/// Cheaply cloneable (backed by [`SmolStr`]) since every `fire` call and
/// every transition-table lookup clones or compares one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(SmolStr);

impl EventKind {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// An event fired at a machine instance, carrying an opaque payload.
///
/// `P` is left to the embedding application (a call-control event, an SMS
/// delivery report, an order-state change, ...); the engine only ever
/// inspects `event_type` when matching a transition or stay action.
#[derive(Debug, Clone)]
pub struct Event<P> {
    pub event_type: EventKind,
    pub payload: P,
    pub occurred_at: SystemTime,
}

impl<P> Event<P> {
    pub fn new(event_type: impl Into<EventKind>, payload: P) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            occurred_at: SystemTime::now(),
        }
    }

    pub fn at(event_type: impl Into<EventKind>, payload: P, occurred_at: SystemTime) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            occurred_at,
        }
    }

    pub fn occurred_at_epoch_ms(&self) -> u64 {
        self.occurred_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_equality_is_string_based() {
        assert_eq!(EventKind::new("answer"), EventKind::from("answer"));
        assert_ne!(EventKind::new("answer"), EventKind::new("hangup"));
    }

    #[test]
    fn event_carries_payload_and_timestamp() {
        let ev = Event::new("answer", 42u32);
        assert_eq!(ev.event_type.as_str(), "answer");
        assert_eq!(ev.payload, 42);
        assert!(ev.occurred_at_epoch_ms() > 0);
    }
}
