//! Cache of frontier parent nodes for cheap re-entry into a walk.
//!
//! Pairs with [`HexaryTrieFog`](super::HexaryTrieFog): when the walk keeps
//! the parent node of each unexplored prefix cached, expanding a prefix
//! needs a single `traverse_from` from the cached parent instead of a
//! root-down `traverse`. Entries go stale when the trie mutates; evicting
//! them is the caller's responsibility.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::data::Nibbles;
use crate::merkle::AnnotatedNode;

/// LRU cache from an unexplored prefix to its parent node and the segment
/// leading from that parent to the prefix.
pub struct TrieFrontierCache {
    cache: LruCache<Nibbles, (AnnotatedNode, Nibbles)>,
}

impl TrieFrontierCache {
    /// Creates a cache holding at most `capacity` prefixes. A zero
    /// capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = match NonZeroUsize::new(capacity) {
            Some(capacity) => capacity,
            None => NonZeroUsize::MIN,
        };
        TrieFrontierCache {
            cache: LruCache::new(capacity),
        }
    }

    /// Looks up the cached parent of `prefix`, returning the parent node
    /// and the segment from the parent to `prefix`.
    pub fn get(&mut self, prefix: &Nibbles) -> Option<(AnnotatedNode, Nibbles)> {
        self.cache.get(prefix).cloned()
    }

    /// Caches `node` as the parent of each `node_prefix + segment`. The
    /// entry for `node_prefix` itself is dropped: its parent is no longer
    /// on the frontier.
    pub fn add(&mut self, node_prefix: &Nibbles, node: AnnotatedNode, sub_segments: &[Nibbles]) {
        if !node_prefix.is_empty() {
            self.cache.pop(node_prefix);
        }
        for segment in sub_segments {
            self.cache
                .put(node_prefix.join(segment), (node.clone(), segment.clone()));
        }
    }

    /// Drops the cached parent for `prefix`, if any.
    pub fn delete(&mut self, prefix: &Nibbles) {
        self.cache.pop(prefix);
    }

    /// Number of cached prefixes.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
