//! Strategy registries.
//!
//! Every pluggable capability (chunker, embedder, retriever, generator,
//! post-processor) is registered by id in a [`Registry`] owned by the
//! engine. There is no process-global state: registration happens during
//! engine construction and configuration validation resolves ids against
//! these registries.

use std::collections::HashMap;
use std::sync::Arc;

/// Id-keyed registry of shared strategy instances.
///
/// Registration is idempotent under the id: registering the same id twice
/// replaces the entry, so repeated construction paths stay harmless.
pub struct Registry<T: ?Sized> {
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers `entry` under `id`, replacing any previous entry.
    pub fn register(&mut self, id: impl Into<String>, entry: Arc<T>) {
        self.entries.insert(id.into(), entry);
    }

    /// Looks up an entry by id.
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.entries.get(id).cloned()
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
