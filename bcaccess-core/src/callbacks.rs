//! Notifications raised by access and lifecycle flows
//!
//! Every method defaults to a no-op so front ends implement only what they
//! react to. Callbacks run inline on the task that completed the flow.

use crate::node::Node;
use std::sync::{Arc, Mutex, PoisonError};

pub trait AccessCallbacks: Send + Sync {
    fn on_signed_in(&self, _node: &Arc<Node>) {}

    fn on_signed_up(&self, _node: &Arc<Node>) {}

    fn on_signed_out(&self) {}

    fn on_keys_imported(&self, _alias: &str) {}

    fn on_keys_exported(&self, _alias: &str) {}
}

/// Ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCallbacks;

impl AccessCallbacks for NoCallbacks {}

/// A notification as recorded by `RecordingCallbacks`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessEvent {
    SignedIn(String),
    SignedUp(String),
    SignedOut,
    KeysImported(String),
    KeysExported(String),
}

/// Keeps every notification in order
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<AccessEvent>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AccessEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, event: AccessEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

impl AccessCallbacks for RecordingCallbacks {
    fn on_signed_in(&self, node: &Arc<Node>) {
        self.push(AccessEvent::SignedIn(node.alias().to_string()));
    }

    fn on_signed_up(&self, node: &Arc<Node>) {
        self.push(AccessEvent::SignedUp(node.alias().to_string()));
    }

    fn on_signed_out(&self) {
        self.push(AccessEvent::SignedOut);
    }

    fn on_keys_imported(&self, alias: &str) {
        self.push(AccessEvent::KeysImported(alias.to_string()));
    }

    fn on_keys_exported(&self, alias: &str) {
        self.push(AccessEvent::KeysExported(alias.to_string()));
    }
}
