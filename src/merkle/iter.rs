//! Lazy depth-first iteration over a trie.
//!
//! [`NodeIterator`] walks the current root with an explicit stack, yielding
//! every node together with its prefix in nibble-lexicographic order. The
//! `keys`/`values`/`items` adapters surface only key termini. Store reads
//! happen on demand, so iteration over a trie with missing bodies fails at
//! the first unreachable node.

use crate::data::Nibbles;
use crate::store::ReadStore;

use super::node::{AnnotatedNode, ChildRef, Node};
use super::trie::{HexaryTrie, TrieError};

/// Restartable depth-first walker over the nodes of a trie.
pub struct NodeIterator<'a, S> {
    trie: &'a HexaryTrie<S>,
    /// Pending (prefix, reference) pairs; pushed in reverse slot order so
    /// smaller prefixes pop first.
    stack: Vec<(Nibbles, ChildRef)>,
    failed: bool,
}

impl<'a, S: ReadStore> NodeIterator<'a, S> {
    /// Creates an iterator over the trie's current root.
    pub fn new(trie: &'a HexaryTrie<S>) -> Self {
        NodeIterator {
            trie,
            stack: vec![(Nibbles::new(), ChildRef::Hash(trie.root_hash()))],
            failed: false,
        }
    }

    /// Iterates over the stored keys, in order.
    pub fn keys(self) -> impl Iterator<Item = Result<Vec<u8>, TrieError>> + 'a {
        self.filter_map(|entry| match entry {
            Ok((prefix, node)) => node.key_at(&prefix).map(Ok),
            Err(err) => Some(Err(err)),
        })
    }

    /// Iterates over the stored values, in key order.
    pub fn values(self) -> impl Iterator<Item = Result<Vec<u8>, TrieError>> + 'a {
        self.filter_map(|entry| match entry {
            Ok((_, node)) => node.value.map(Ok),
            Err(err) => Some(Err(err)),
        })
    }

    /// Iterates over `(key, value)` pairs, in key order.
    pub fn items(self) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), TrieError>> + 'a {
        self.filter_map(|entry| match entry {
            Ok((prefix, node)) => {
                let key = node.key_at(&prefix)?;
                let value = node.value?;
                Some(Ok((key, value)))
            }
            Err(err) => Some(Err(err)),
        })
    }
}

impl<S: ReadStore> Iterator for NodeIterator<'_, S> {
    type Item = Result<(Nibbles, AnnotatedNode), TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let (prefix, child_ref) = self.stack.pop()?;
            let node = match self.trie.get_node(&child_ref) {
                Ok(node) => node,
                Err(err) => {
                    self.failed = true;
                    let err = match err {
                        TrieError::MissingTraversalNode { missing_hash, .. } => {
                            TrieError::MissingTraversalNode {
                                missing_hash,
                                prefix,
                            }
                        }
                        other => other,
                    };
                    return Some(Err(err));
                }
            };

            match &node {
                Node::Blank => continue,
                Node::Leaf { .. } => {}
                Node::Extension { path, child } => {
                    self.stack.push((prefix.join(path), child.clone()));
                }
                Node::Branch { children, .. } => {
                    for (slot, child) in children.iter().enumerate().rev() {
                        if !child.is_empty() {
                            let mut child_prefix = prefix.clone();
                            child_prefix.push(slot as u8);
                            self.stack.push((child_prefix, child.clone()));
                        }
                    }
                }
            }

            return Some(Ok((prefix, node.annotate())));
        }
    }
}
