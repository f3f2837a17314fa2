//! Port registry -- a named collection of available backend ports.
//!
//! The registry lets the session layer look ports up by name at runtime
//! (e.g. when a workspace is configured with `backend = "claude-code"`).

use std::collections::HashMap;
use std::sync::Arc;

use super::trait_def::BackendPort;

/// A collection of registered [`BackendPort`] implementations, keyed by
/// name. Ports are stored as `Arc` so an adapter can hold one while the
/// registry keeps serving lookups.
#[derive(Default)]
pub struct PortRegistry {
    ports: HashMap<String, Arc<dyn BackendPort>>,
}

impl PortRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port under the name returned by [`BackendPort::name`].
    ///
    /// If a port with the same name is already registered, it is replaced
    /// and the old one is returned.
    pub fn register(&mut self, port: impl BackendPort + 'static) -> Option<Arc<dyn BackendPort>> {
        let name = port.name().to_string();
        self.ports.insert(name, Arc::new(port))
    }

    /// Look up a port by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn BackendPort>> {
        self.ports.get(name).cloned()
    }

    /// Names of all registered ports, in no guaranteed order.
    pub fn list(&self) -> Vec<&str> {
        self.ports.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRegistry")
            .field("ports", &self.ports.keys().collect::<Vec<_>>())
            .finish()
    }
}
