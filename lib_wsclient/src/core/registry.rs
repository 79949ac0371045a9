//! # Connection Registry
//!
//! Maps stable connection ids to the current runtime mailbox. Consumers
//! only ever hold the stable id; after a supervised restart the id is
//! re-registered to the new runtime before any command is accepted, so a
//! held id keeps working across restarts.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::runtime::RuntimeHandle;
use crate::session::ConnectionId;

/// Shared id → runtime mapping.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<ConnectionId, RuntimeHandle>>>,
}

impl ConnectionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-registers) the runtime behind a stable id.
    pub fn register(&self, id: ConnectionId, handle: RuntimeHandle) {
        let mut connections = self.connections.lock().expect("registry lock poisoned");
        if connections.insert(id.clone(), handle).is_some() {
            log::debug!("re-registered connection {}", id);
        }
    }

    /// Removes a connection. Returns false for unknown ids.
    pub fn deregister(&self, id: &ConnectionId) -> bool {
        let mut connections = self.connections.lock().expect("registry lock poisoned");
        connections.remove(id).is_some()
    }

    /// Resolves a stable id to the current runtime mailbox.
    pub fn lookup(&self, id: &ConnectionId) -> Option<RuntimeHandle> {
        let connections = self.connections.lock().expect("registry lock poisoned");
        connections.get(id).cloned()
    }

    /// All registered ids.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let connections = self.connections.lock().expect("registry lock poisoned");
        connections.keys().cloned().collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        let connections = self.connections.lock().expect("registry lock poisoned");
        connections.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle() -> RuntimeHandle {
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        RuntimeHandle::new(cmd_tx)
    }

    #[test]
    fn register_lookup_deregister() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::mint();
        assert!(registry.lookup(&id).is_none());

        registry.register(id.clone(), handle());
        assert!(registry.lookup(&id).is_some());
        assert_eq!(registry.len(), 1);

        // Re-registration replaces the runtime behind the same id.
        registry.register(id.clone(), handle());
        assert_eq!(registry.len(), 1);

        assert!(registry.deregister(&id));
        assert!(!registry.deregister(&id));
        assert!(registry.is_empty());
    }
}
