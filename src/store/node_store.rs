//! Node store traits and the in-memory store.
//!
//! The trie resolves node bodies through these traits: 32-byte keccak
//! digests map to raw RLP bodies. Reads and writes are split so that
//! read-only snapshots can borrow a store that something else owns.

use hashbrown::HashMap;
use primitive_types::H256;
use rustc_hash::FxBuildHasher;

use super::metrics::StoreMetrics;

/// Type alias for our fast HashMap with FxHash.
///
/// Keys are keccak digests, already uniformly distributed, so a
/// non-cryptographic hasher is safe here.
pub(crate) type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Read access to node bodies by digest.
pub trait ReadStore {
    /// Reads the body stored under `key`, if any.
    fn get(&self, key: &H256) -> Option<Vec<u8>>;

    /// True if a body is stored under `key`.
    fn contains(&self, key: &H256) -> bool;
}

/// Read/write access to node bodies by digest.
pub trait WriteStore: ReadStore {
    /// Stores `body` under `key`, replacing any previous body.
    fn insert(&mut self, key: H256, body: Vec<u8>);

    /// Removes the body stored under `key`. Deleting an absent key is a
    /// no-op.
    fn delete(&mut self, key: &H256);
}

impl<T: ReadStore + ?Sized> ReadStore for &T {
    fn get(&self, key: &H256) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn contains(&self, key: &H256) -> bool {
        (**self).contains(key)
    }
}

impl<T: ReadStore + ?Sized> ReadStore for &mut T {
    fn get(&self, key: &H256) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn contains(&self, key: &H256) -> bool {
        (**self).contains(key)
    }
}

impl<T: WriteStore + ?Sized> WriteStore for &mut T {
    fn insert(&mut self, key: H256, body: Vec<u8>) {
        (**self).insert(key, body)
    }

    fn delete(&mut self, key: &H256) {
        (**self).delete(key)
    }
}

/// In-memory node store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    nodes: FastHashMap<H256, Vec<u8>>,
    metrics: StoreMetrics,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store sized for an expected number of bodies.
    pub fn with_capacity(bodies: usize) -> Self {
        Self {
            nodes: FastHashMap::with_capacity_and_hasher(bodies, FxBuildHasher),
            metrics: StoreMetrics::new(),
        }
    }

    /// Number of stored bodies.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no bodies are stored.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Operation counters for this store.
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Iterates over the stored `(digest, body)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&H256, &Vec<u8>)> {
        self.nodes.iter()
    }

    /// Removes every stored body.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl PartialEq for MemoryStore {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl ReadStore for MemoryStore {
    fn get(&self, key: &H256) -> Option<Vec<u8>> {
        let body = self.nodes.get(key).cloned();
        self.metrics.record_read(body.is_some());
        body
    }

    fn contains(&self, key: &H256) -> bool {
        self.nodes.contains_key(key)
    }
}

impl WriteStore for MemoryStore {
    fn insert(&mut self, key: H256, body: Vec<u8>) {
        self.metrics.record_write();
        self.nodes.insert(key, body);
    }

    fn delete(&mut self, key: &H256) {
        self.metrics.record_delete();
        self.nodes.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::keccak256;

    #[test]
    fn test_insert_get_delete() {
        let mut store = MemoryStore::new();
        let key = keccak256(b"body");

        assert_eq!(store.get(&key), None);
        store.insert(key, b"body".to_vec());
        assert_eq!(store.get(&key), Some(b"body".to_vec()));
        assert!(store.contains(&key));

        store.delete(&key);
        assert_eq!(store.get(&key), None);
        // idempotent
        store.delete(&key);
        assert!(store.is_empty());
    }

    #[test]
    fn test_metrics_track_operations() {
        let mut store = MemoryStore::new();
        let key = keccak256(b"x");

        store.get(&key);
        store.insert(key, b"x".to_vec());
        store.get(&key);

        assert_eq!(store.metrics().reads(), 2);
        assert_eq!(store.metrics().misses(), 1);
        assert_eq!(store.metrics().writes(), 1);
    }

    #[test]
    fn test_borrowed_store_reads() {
        let mut store = MemoryStore::new();
        let key = keccak256(b"y");
        store.insert(key, b"y".to_vec());

        let borrowed = &store;
        assert_eq!(ReadStore::get(&borrowed, &key), Some(b"y".to_vec()));
    }
}
