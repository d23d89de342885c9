//! Overlay store backing the squash transaction.
//!
//! Writes and deletes are staged in an in-memory cache over a borrowed
//! store. Nothing reaches the underlying store until [`ScratchStore::commit`];
//! dropping the overlay without committing discards everything. A staged
//! delete still reads through to the underlying store, because deletes only
//! take effect at commit time.

use primitive_types::H256;

use super::node_store::{FastHashMap, ReadStore, WriteStore};

/// Staged view over a mutable node store. `None` marks a pending delete.
#[derive(Debug)]
pub struct ScratchStore<'a, S> {
    inner: &'a mut S,
    cache: FastHashMap<H256, Option<Vec<u8>>>,
}

impl<'a, S: WriteStore> ScratchStore<'a, S> {
    /// Wraps a store with an empty overlay.
    pub fn new(inner: &'a mut S) -> Self {
        Self {
            inner,
            cache: FastHashMap::default(),
        }
    }

    /// Number of staged entries (writes and deletes).
    pub fn staged(&self) -> usize {
        self.cache.len()
    }

    /// Flushes staged writes to the underlying store. Staged deletes are
    /// applied only when `apply_deletes` is set, otherwise they are
    /// dropped.
    pub fn commit(self, apply_deletes: bool) {
        let ScratchStore { inner, cache } = self;
        for (key, entry) in cache {
            match entry {
                Some(body) => inner.insert(key, body),
                None if apply_deletes => inner.delete(&key),
                None => {}
            }
        }
    }
}

impl<S: ReadStore> ReadStore for ScratchStore<'_, S> {
    fn get(&self, key: &H256) -> Option<Vec<u8>> {
        match self.cache.get(key) {
            Some(Some(body)) => Some(body.clone()),
            // pending delete: the body is still live until commit
            Some(None) => self.inner.get(key),
            None => self.inner.get(key),
        }
    }

    fn contains(&self, key: &H256) -> bool {
        match self.cache.get(key) {
            Some(Some(_)) => true,
            Some(None) => self.inner.contains(key),
            None => self.inner.contains(key),
        }
    }
}

impl<S: WriteStore> WriteStore for ScratchStore<'_, S> {
    fn insert(&mut self, key: H256, body: Vec<u8>) {
        self.cache.insert(key, Some(body));
    }

    fn delete(&mut self, key: &H256) {
        self.cache.insert(*key, None);
    }
}
