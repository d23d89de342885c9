//! The hexary Merkle Patricia Trie engine.
//!
//! `HexaryTrie` maps arbitrary byte keys to non-empty byte values on top of
//! a content-addressed node store. Every mutation rebuilds the spine from
//! the touched leaf to the root and produces a new 32-byte root digest that
//! commits to the full map. Sibling subtrees are untouched and reachable
//! through the store under both old and new roots.
//!
//! Setting a key to the empty value is the same operation as deleting it.

use primitive_types::H256;
use thiserror::Error;

use crate::data::nibbles::{common_prefix_len, key_starts_with};
use crate::data::Nibbles;
use crate::store::{FastHashMap, ReadStore, ScratchStore, WriteStore};

use super::node::{keccak256, AnnotatedNode, ChildRef, Node, EMPTY_ROOT, HASH_SIZE};
use super::rlp::RlpError;

/// Trie errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrieError {
    /// A referenced node body could not be resolved while operating on a
    /// user key. `prefix` is the path traversed from the root when known;
    /// mutations report it as absent.
    #[error("missing trie node {missing_hash:x} for key {key:?} under root {root_hash:x}")]
    MissingTrieNode {
        missing_hash: H256,
        root_hash: H256,
        key: Vec<u8>,
        prefix: Option<Nibbles>,
    },

    /// A referenced node body could not be resolved during traversal,
    /// where no user key is available.
    #[error("missing trie node {missing_hash:x} at prefix {prefix}")]
    MissingTraversalNode { missing_hash: H256, prefix: Nibbles },

    /// A traversal path ended inside the compact segment of a leaf or
    /// extension. Non-fatal for walkers: `simulated_node` is the segment
    /// tail sliced out as a standalone node, ready to be explored.
    #[error("path ended inside a node segment at prefix {prefix}, tail {untraversed_tail}")]
    TraversedPartialPath {
        prefix: Nibbles,
        simulated_node: AnnotatedNode,
        untraversed_tail: Nibbles,
    },

    /// Proof verification failed: a referenced digest has no matching body
    /// among the proof elements.
    #[error("invalid proof: no body for referenced node {missing_hash:x}")]
    InvalidProof { missing_hash: H256 },

    /// A stored node body failed to decode.
    #[error("invalid node encoding")]
    InvalidNode(#[from] RlpError),

    /// An internal consistency check tripped; never produced by
    /// well-formed input.
    #[error("trie invariant violated: {0}")]
    BadTrieInvariant(String),
}

/// A hexary Merkle Patricia Trie over a node store.
///
/// The trie object holds only the root hash and the store handle; all node
/// state lives in the store, keyed by keccak256 of the node body. Two tries
/// that encode the same key/value map have identical root hashes.
pub struct HexaryTrie<S> {
    store: S,
    root_hash: H256,
    pruning: bool,
    /// Reference counts per stored digest, tracked only while pruning.
    ref_count: Option<FastHashMap<H256, i64>>,
}

impl<S: ReadStore> HexaryTrie<S> {
    /// Creates an empty trie over `store`.
    pub fn new(store: S) -> Self {
        Self::with_root(store, EMPTY_ROOT)
    }

    /// Opens the trie committed at `root_hash` in `store`.
    pub fn with_root(store: S, root_hash: H256) -> Self {
        HexaryTrie {
            store,
            root_hash,
            pruning: false,
            ref_count: None,
        }
    }

    /// Opens the trie at `root_hash` with pruning enabled: superseded node
    /// bodies are deleted from the store after each successful mutation.
    ///
    /// Pruning is only safe against a store whose residency is owned by
    /// this trie alone (typically a freshly populated one). Bodies that
    /// predate this trie have unknown reference counts and may be deleted
    /// out from under other roots.
    pub fn with_pruning(store: S, root_hash: H256) -> Self {
        HexaryTrie {
            store,
            root_hash,
            pruning: true,
            ref_count: Some(FastHashMap::default()),
        }
    }

    /// The current root hash.
    pub fn root_hash(&self) -> H256 {
        self.root_hash
    }

    /// True if the trie holds no keys.
    pub fn is_empty(&self) -> bool {
        self.root_hash == EMPTY_ROOT
    }

    /// True if pruning is enabled.
    pub fn is_pruning(&self) -> bool {
        self.pruning
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the trie and returns the backing store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// A read-only view of this trie's map at an earlier root.
    ///
    /// # Panics
    /// Panics when called on a pruning trie: pruned history is not
    /// navigable.
    pub fn at_root(&self, root_hash: H256) -> HexaryTrie<&S> {
        assert!(
            !self.pruning,
            "cannot snapshot a pruning trie at an earlier root"
        );
        HexaryTrie::with_root(&self.store, root_hash)
    }

    /// Looks up `key`, returning its value or `None` when absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let trie_key = Nibbles::from_bytes(key);
        self.get_nibbles(&trie_key).map_err(|err| match err {
            TrieError::MissingTraversalNode {
                missing_hash,
                prefix,
            } => TrieError::MissingTrieNode {
                missing_hash,
                root_hash: self.root_hash,
                key: key.to_vec(),
                prefix: Some(prefix),
            },
            other => other,
        })
    }

    /// True if `key` maps to a value.
    pub fn exists(&self, key: &[u8]) -> Result<bool, TrieError> {
        Ok(self.get(key)?.is_some())
    }

    /// The annotated root node.
    pub fn root_node(&self) -> Result<AnnotatedNode, TrieError> {
        Ok(self.root_node_raw()?.annotate())
    }

    /// Finds the node at the given path of nibbles from the root. The
    /// trivial example is `traverse(&Nibbles::new())` for the root node.
    ///
    /// Fails with [`TrieError::MissingTraversalNode`] when a body is
    /// missing from the store, and with [`TrieError::TraversedPartialPath`]
    /// when the path ends inside a leaf's or extension's segment.
    pub fn traverse(&self, path: &Nibbles) -> Result<AnnotatedNode, TrieError> {
        let root = self.root_node_raw()?;
        self.traverse_annotated(root, path)
    }

    /// Like [`traverse`](Self::traverse), but starts from a previously
    /// fetched node instead of the root. The path and hashes from the root
    /// to `parent` are not re-verified.
    pub fn traverse_from(
        &self,
        parent: &AnnotatedNode,
        path: &Nibbles,
    ) -> Result<AnnotatedNode, TrieError> {
        self.traverse_annotated(parent.raw.clone(), path)
    }

    fn get_nibbles(&self, trie_key: &Nibbles) -> Result<Option<Vec<u8>>, TrieError> {
        let root = self.root_node_raw()?;
        let (node, consumed) = self.traverse_raw(root, trie_key.as_slice())?;
        let remaining = &trie_key.as_slice()[consumed..];

        match node {
            Node::Blank => Ok(None),
            Node::Leaf { path, value } => {
                if path.as_slice() == remaining {
                    Ok(Some(value))
                } else {
                    Ok(None)
                }
            }
            // the key ended inside the extension's segment
            Node::Extension { .. } => Ok(None),
            Node::Branch { value, .. } => {
                if remaining.is_empty() {
                    Ok(value)
                } else {
                    Err(TrieError::BadTrieInvariant(
                        "traversal returned a branch with unconsumed key".into(),
                    ))
                }
            }
        }
    }

    fn traverse_annotated(&self, start: Node, path: &Nibbles) -> Result<AnnotatedNode, TrieError> {
        let (node, consumed) = self.traverse_raw(start, path.as_slice())?;
        let remaining = &path.as_slice()[consumed..];
        if remaining.is_empty() {
            return Ok(node.annotate());
        }

        // The path ends inside this node's segment. Slice the node at the
        // traversal point and report the tail as a standalone node. A path
        // ending exactly at the end of a leaf segment lands here too, with
        // an empty-path leaf as the tail: the position is a key terminus,
        // not a node boundary.
        let prefix = Nibbles::from_slice(&path.as_slice()[..consumed]);
        let tail = Nibbles::from_slice(remaining);
        let simulated = match node {
            Node::Leaf { path, value } => Node::Leaf {
                path: path.slice_from(tail.len()),
                value,
            },
            Node::Extension { path, child } => Node::Extension {
                path: path.slice_from(tail.len()),
                child,
            },
            _ => {
                return Err(TrieError::BadTrieInvariant(
                    "partial traversal stopped on a non-segment node".into(),
                ))
            }
        };
        Err(TrieError::TraversedPartialPath {
            prefix,
            simulated_node: simulated.annotate(),
            untraversed_tail: tail,
        })
    }

    /// Walks down from `start`, consuming `path`. Returns the deepest node
    /// reached and the number of nibbles consumed. Stops early (with fewer
    /// nibbles consumed) only when the path ends inside a leaf's or
    /// extension's segment; mismatches resolve to the blank node.
    fn traverse_raw(&self, start: Node, path: &[u8]) -> Result<(Node, usize), TrieError> {
        let mut node = start;
        let mut consumed = 0;

        while consumed < path.len() {
            let remaining = &path[consumed..];
            let next_ref = match &node {
                Node::Blank => return Ok((Node::Blank, path.len())),
                Node::Leaf { path: leaf_path, .. } => {
                    let cp = common_prefix_len(leaf_path.as_slice(), remaining);
                    if cp == remaining.len() {
                        // the path ends on or inside this leaf's segment
                        return Ok((node, consumed));
                    }
                    return Ok((Node::Blank, path.len()));
                }
                Node::Extension {
                    path: ext_path,
                    child,
                } => {
                    let cp = common_prefix_len(ext_path.as_slice(), remaining);
                    if cp == ext_path.len() {
                        consumed += cp;
                        child.clone()
                    } else if cp == remaining.len() {
                        // the path ends inside this extension's segment
                        return Ok((node, consumed));
                    } else {
                        return Ok((Node::Blank, path.len()));
                    }
                }
                Node::Branch { children, .. } => {
                    let slot = remaining[0] as usize;
                    consumed += 1;
                    children[slot].clone()
                }
            };

            node = self.get_node(&next_ref).map_err(|err| match err {
                TrieError::MissingTraversalNode { missing_hash, .. } => {
                    TrieError::MissingTraversalNode {
                        missing_hash,
                        prefix: Nibbles::from_slice(&path[..consumed]),
                    }
                }
                other => other,
            })?;
        }

        Ok((node, consumed))
    }

    /// Resolves a child reference to its decoded node.
    pub(crate) fn get_node(&self, child: &ChildRef) -> Result<Node, TrieError> {
        match child {
            ChildRef::Empty => Ok(Node::Blank),
            ChildRef::Hash(hash) if *hash == EMPTY_ROOT => Ok(Node::Blank),
            ChildRef::Inline(raw) => Ok(Node::decode(raw)?),
            ChildRef::Hash(hash) => {
                let body = self
                    .store
                    .get(hash)
                    .ok_or(TrieError::MissingTraversalNode {
                        missing_hash: *hash,
                        prefix: Nibbles::new(),
                    })?;
                Ok(Node::decode(&body)?)
            }
        }
    }

    fn root_node_raw(&self) -> Result<Node, TrieError> {
        self.get_node(&ChildRef::Hash(self.root_hash))
    }

    /// The storage reference a node would have, without writing anything.
    fn node_ref(node: &Node) -> (ChildRef, Option<Vec<u8>>) {
        if node.is_blank() {
            return (ChildRef::Empty, None);
        }
        let encoded = node.encode();
        if encoded.len() < HASH_SIZE {
            (ChildRef::Inline(encoded), None)
        } else {
            (ChildRef::Hash(keccak256(&encoded)), Some(encoded))
        }
    }
}

impl<S: WriteStore> HexaryTrie<S> {
    /// Maps `key` to `value`. An empty `value` deletes the key.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        let trie_key = Nibbles::from_bytes(key);
        let mut pending = Vec::new();

        let result = if value.is_empty() {
            self.delete_root(&trie_key, &mut pending)
        } else {
            self.set_root(&trie_key, value, &mut pending)
        };

        match result {
            Ok(()) => {
                self.complete_pruning(pending);
                Ok(())
            }
            Err(err) => Err(self.wrap_mutation_error(err, key)),
        }
    }

    /// Removes `key` from the map. Deleting an absent key is a no-op and
    /// touches neither the store nor the root.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let trie_key = Nibbles::from_bytes(key);
        let mut pending = Vec::new();

        match self.delete_root(&trie_key, &mut pending) {
            Ok(()) => {
                self.complete_pruning(pending);
                Ok(())
            }
            Err(err) => Err(self.wrap_mutation_error(err, key)),
        }
    }

    /// Runs `f` against a transactional view of this trie. All node writes
    /// go to an in-memory overlay and stale bodies accumulate as prune
    /// candidates. On `Ok` the overlay is flushed to the store (and, if
    /// this trie prunes, stale bodies are deleted) and the root advances.
    /// On `Err` the overlay and prune candidates are discarded and the
    /// root hash keeps its pre-transaction value.
    pub fn squash_changes<T, F>(&mut self, f: F) -> Result<T, TrieError>
    where
        F: for<'a> FnOnce(&mut HexaryTrie<ScratchStore<'a, S>>) -> Result<T, TrieError>,
    {
        let outer_pruning = self.pruning;
        let prior_counts = if outer_pruning {
            self.ref_count.take()
        } else {
            None
        };

        let mut batch = HexaryTrie {
            store: ScratchStore::new(&mut self.store),
            root_hash: self.root_hash,
            pruning: true,
            ref_count: Some(prior_counts.clone().unwrap_or_default()),
        };

        let result = f(&mut batch);

        let HexaryTrie {
            store: scratch,
            root_hash: batch_root,
            ref_count: batch_counts,
            ..
        } = batch;

        match result {
            Ok(value) => {
                scratch.commit(outer_pruning);
                if outer_pruning {
                    self.ref_count = batch_counts;
                }
                self.root_hash = batch_root;
                Ok(value)
            }
            Err(err) => {
                // the overlay's counts reflect writes the store never saw;
                // the pre-transaction counts are the truthful ones
                drop(scratch);
                if outer_pruning {
                    self.ref_count = prior_counts;
                }
                Err(err)
            }
        }
    }

    fn wrap_mutation_error(&self, err: TrieError, key: &[u8]) -> TrieError {
        match err {
            TrieError::MissingTraversalNode { missing_hash, .. } => TrieError::MissingTrieNode {
                missing_hash,
                root_hash: self.root_hash,
                key: key.to_vec(),
                // the traversed prefix is not tracked while rebuilding
                prefix: None,
            },
            other => other,
        }
    }

    fn set_root(
        &mut self,
        trie_key: &Nibbles,
        value: &[u8],
        pending: &mut Vec<H256>,
    ) -> Result<(), TrieError> {
        let root = self.root_node_raw()?;
        let new_root = self.set_at(root, trie_key.as_slice(), value, pending)?;
        self.set_root_node(new_root, pending);
        Ok(())
    }

    fn delete_root(&mut self, trie_key: &Nibbles, pending: &mut Vec<H256>) -> Result<(), TrieError> {
        let root = self.root_node_raw()?;
        let new_root = self.delete_at(root, trie_key.as_slice(), pending)?;
        self.set_root_node(new_root, pending);
        Ok(())
    }

    /// Commits a new root node. Root bodies are always persisted under
    /// their digest, even when small enough to inline; the empty root body
    /// is never persisted.
    fn set_root_node(&mut self, new_root: Node, pending: &mut Vec<H256>) {
        let old_root = self.root_hash;

        let (new_hash, encoded) = if new_root.is_blank() {
            (EMPTY_ROOT, None)
        } else {
            let encoded = new_root.encode();
            (keccak256(&encoded), Some(encoded))
        };

        if new_hash == old_root {
            return;
        }

        if let Some(body) = encoded {
            self.write_body(new_hash, body);
        }
        if self.pruning && old_root != EMPTY_ROOT && self.store.contains(&old_root) {
            pending.push(old_root);
        }
        self.root_hash = new_hash;
    }

    fn set_at(
        &mut self,
        node: Node,
        key: &[u8],
        value: &[u8],
        pending: &mut Vec<H256>,
    ) -> Result<Node, TrieError> {
        match node {
            Node::Blank => Ok(Node::leaf(Nibbles::from_slice(key), value.to_vec())),
            Node::Leaf {
                path,
                value: leaf_value,
            } => self.set_in_leaf(path, leaf_value, key, value),
            Node::Extension { path, child } => self.set_in_extension(path, child, key, value, pending),
            Node::Branch {
                mut children,
                value: branch_value,
            } => {
                if let Some((&slot, rest)) = key.split_first() {
                    let slot = slot as usize;
                    let old_ref = std::mem::take(&mut children[slot]);
                    let child = self.get_node(&old_ref)?;
                    let new_child = self.set_at(child, rest, value, pending)?;
                    children[slot] = self.commit_child(&old_ref, &new_child, pending);
                    Ok(Node::Branch {
                        children,
                        value: branch_value,
                    })
                } else {
                    Ok(Node::Branch {
                        children,
                        value: Some(value.to_vec()),
                    })
                }
            }
        }
    }

    fn set_in_leaf(
        &mut self,
        path: Nibbles,
        leaf_value: Vec<u8>,
        key: &[u8],
        value: &[u8],
    ) -> Result<Node, TrieError> {
        let cp = common_prefix_len(path.as_slice(), key);
        let path_rem = path.slice_from(cp);
        let key_rem = &key[cp..];

        if path_rem.is_empty() && key_rem.is_empty() {
            return Ok(Node::Leaf {
                path,
                value: value.to_vec(),
            });
        }

        if path_rem.is_empty() {
            // the new key passes through this leaf's terminus
            let mut children: Box<[ChildRef; 16]> = Box::new(Default::default());
            let tail = Node::leaf(Nibbles::from_slice(&key_rem[1..]), value.to_vec());
            children[key_rem[0] as usize] = self.persist_node(&tail);
            let branch = Node::Branch {
                children,
                value: Some(leaf_value),
            };
            return Ok(self.wrap_in_extension(path, branch));
        }

        // the paths diverge inside this leaf's segment
        let mut children: Box<[ChildRef; 16]> = Box::new(Default::default());
        let old_tail = Node::leaf(path_rem.slice_from(1), leaf_value);
        children[path_rem.as_slice()[0] as usize] = self.persist_node(&old_tail);

        let mut branch_value = None;
        if let Some((&first, rest)) = key_rem.split_first() {
            let new_tail = Node::leaf(Nibbles::from_slice(rest), value.to_vec());
            children[first as usize] = self.persist_node(&new_tail);
        } else {
            branch_value = Some(value.to_vec());
        }

        let branch = Node::Branch {
            children,
            value: branch_value,
        };
        Ok(self.wrap_in_extension(Nibbles::from_slice(&path.as_slice()[..cp]), branch))
    }

    fn set_in_extension(
        &mut self,
        path: Nibbles,
        child: ChildRef,
        key: &[u8],
        value: &[u8],
        pending: &mut Vec<H256>,
    ) -> Result<Node, TrieError> {
        let cp = common_prefix_len(path.as_slice(), key);
        let path_rem = path.slice_from(cp);
        let key_rem = &key[cp..];

        if path_rem.is_empty() {
            // descend; an exhausted key sets the value of the child branch
            let sub = self.get_node(&child)?;
            let new_sub = self.set_at(sub, key_rem, value, pending)?;
            let new_ref = self.commit_child(&child, &new_sub, pending);
            return Ok(Node::Extension {
                path,
                child: new_ref,
            });
        }

        // the key leaves this extension's segment partway down
        let mut children: Box<[ChildRef; 16]> = Box::new(Default::default());
        let slot = path_rem.as_slice()[0] as usize;
        if path_rem.len() == 1 {
            children[slot] = child;
        } else {
            let tail = Node::Extension {
                path: path_rem.slice_from(1),
                child,
            };
            children[slot] = self.persist_node(&tail);
        }

        let mut branch_value = None;
        if let Some((&first, rest)) = key_rem.split_first() {
            let new_tail = Node::leaf(Nibbles::from_slice(rest), value.to_vec());
            children[first as usize] = self.persist_node(&new_tail);
        } else {
            branch_value = Some(value.to_vec());
        }

        let branch = Node::Branch {
            children,
            value: branch_value,
        };
        Ok(self.wrap_in_extension(Nibbles::from_slice(&path.as_slice()[..cp]), branch))
    }

    fn delete_at(
        &mut self,
        node: Node,
        key: &[u8],
        pending: &mut Vec<H256>,
    ) -> Result<Node, TrieError> {
        match node {
            Node::Blank => Ok(Node::Blank),
            Node::Leaf { path, value } => {
                if path.as_slice() == key {
                    Ok(Node::Blank)
                } else {
                    Ok(Node::Leaf { path, value })
                }
            }
            Node::Extension { path, child } => self.delete_in_extension(path, child, key, pending),
            Node::Branch { children, value } => self.delete_in_branch(children, value, key, pending),
        }
    }

    fn delete_in_extension(
        &mut self,
        path: Nibbles,
        child: ChildRef,
        key: &[u8],
        pending: &mut Vec<H256>,
    ) -> Result<Node, TrieError> {
        if !key_starts_with(key, path.as_slice()) {
            // the key is not under this extension
            return Ok(Node::Extension { path, child });
        }

        let sub = self.get_node(&child)?;
        let new_sub = self.delete_at(sub, &key[path.len()..], pending)?;
        let new_ref = self.commit_child(&child, &new_sub, pending);
        if new_ref == child {
            return Ok(Node::Extension { path, child });
        }

        match new_sub {
            Node::Blank => Ok(Node::Blank),
            // merge a surviving leaf or extension into this segment
            Node::Leaf {
                path: sub_path,
                value,
            } => {
                self.prune_ref(&new_ref, pending);
                Ok(Node::Leaf {
                    path: path.join(&sub_path),
                    value,
                })
            }
            Node::Extension {
                path: sub_path,
                child: grandchild,
            } => {
                self.prune_ref(&new_ref, pending);
                Ok(Node::Extension {
                    path: path.join(&sub_path),
                    child: grandchild,
                })
            }
            Node::Branch { .. } => Ok(Node::Extension {
                path,
                child: new_ref,
            }),
        }
    }

    fn delete_in_branch(
        &mut self,
        mut children: Box<[ChildRef; 16]>,
        value: Option<Vec<u8>>,
        key: &[u8],
        pending: &mut Vec<H256>,
    ) -> Result<Node, TrieError> {
        let Some((&slot, rest)) = key.split_first() else {
            if value.is_none() {
                // nothing stored at this branch itself
                return Ok(Node::Branch { children, value });
            }
            return self.normalize_branch(children, None, pending);
        };

        let slot = slot as usize;
        if children[slot].is_empty() {
            return Ok(Node::Branch { children, value });
        }

        let old_ref = std::mem::take(&mut children[slot]);
        let child = self.get_node(&old_ref)?;
        let new_child = self.delete_at(child, rest, pending)?;
        let new_ref = self.commit_child(&old_ref, &new_child, pending);
        if new_ref == old_ref {
            children[slot] = old_ref;
            return Ok(Node::Branch { children, value });
        }

        let emptied = new_ref.is_empty();
        children[slot] = new_ref;
        if emptied {
            self.normalize_branch(children, value, pending)
        } else {
            Ok(Node::Branch { children, value })
        }
    }

    /// Restores canonical form for a branch that may have dropped below
    /// two occupants.
    fn normalize_branch(
        &mut self,
        children: Box<[ChildRef; 16]>,
        value: Option<Vec<u8>>,
        pending: &mut Vec<H256>,
    ) -> Result<Node, TrieError> {
        let occupied: Vec<usize> = children
            .iter()
            .enumerate()
            .filter(|(_, child)| !child.is_empty())
            .map(|(slot, _)| slot)
            .collect();

        if occupied.len() >= 2 || (occupied.len() == 1 && value.is_some()) {
            return Ok(Node::Branch { children, value });
        }

        if occupied.is_empty() {
            return match value {
                Some(value) => Ok(Node::Leaf {
                    path: Nibbles::new(),
                    value,
                }),
                None => Ok(Node::Blank),
            };
        }

        // exactly one child and no value: collapse into it
        let slot = occupied[0];
        let child_ref = children[slot].clone();
        let child = self.get_node(&child_ref)?;
        let mut slot_path = Nibbles::new();
        slot_path.push(slot as u8);

        match child {
            Node::Leaf { path, value } => {
                self.prune_ref(&child_ref, pending);
                Ok(Node::Leaf {
                    path: slot_path.join(&path),
                    value,
                })
            }
            Node::Extension { path, child } => {
                self.prune_ref(&child_ref, pending);
                Ok(Node::Extension {
                    path: slot_path.join(&path),
                    child,
                })
            }
            Node::Branch { .. } => Ok(Node::Extension {
                path: slot_path,
                child: child_ref,
            }),
            Node::Blank => Err(TrieError::BadTrieInvariant(
                "occupied branch slot resolved to a blank node".into(),
            )),
        }
    }

    /// Wraps `node` in an extension on `prefix`, or returns it unchanged
    /// when the prefix is empty.
    fn wrap_in_extension(&mut self, prefix: Nibbles, node: Node) -> Node {
        if prefix.is_empty() {
            node
        } else {
            let child = self.persist_node(&node);
            Node::Extension {
                path: prefix,
                child,
            }
        }
    }

    /// Computes the reference for a rebuilt child. When it differs from
    /// the old reference, the new body is written (if hash-sized) and the
    /// old body becomes a prune candidate; when equal, nothing is touched.
    fn commit_child(
        &mut self,
        old_ref: &ChildRef,
        new_node: &Node,
        pending: &mut Vec<H256>,
    ) -> ChildRef {
        let (new_ref, encoded) = Self::node_ref(new_node);
        if new_ref == *old_ref {
            return new_ref;
        }

        if let (ChildRef::Hash(hash), Some(body)) = (&new_ref, encoded) {
            self.write_body(*hash, body);
        }
        self.prune_ref(old_ref, pending);
        new_ref
    }

    /// Writes a freshly built node, returning its reference. Small bodies
    /// inline instead of being written.
    fn persist_node(&mut self, node: &Node) -> ChildRef {
        let (node_ref, encoded) = Self::node_ref(node);
        if let (ChildRef::Hash(hash), Some(body)) = (&node_ref, encoded) {
            self.write_body(*hash, body);
        }
        node_ref
    }

    fn write_body(&mut self, hash: H256, body: Vec<u8>) {
        self.store.insert(hash, body);
        if self.pruning {
            if let Some(counts) = self.ref_count.as_mut() {
                *counts.entry(hash).or_insert(0) += 1;
            }
        }
    }

    /// Marks a superseded reference for deletion. Inlined bodies have no
    /// storage entry and are skipped.
    fn prune_ref(&mut self, child: &ChildRef, pending: &mut Vec<H256>) {
        if !self.pruning {
            return;
        }
        if let ChildRef::Hash(hash) = child {
            pending.push(*hash);
        }
    }

    /// Applies the tentative delete set after the new root is committed.
    /// Each digest's reference count is decremented; bodies reaching zero
    /// are deleted from the store.
    fn complete_pruning(&mut self, pending: Vec<H256>) {
        if !self.pruning || pending.is_empty() {
            return;
        }
        let Some(counts) = self.ref_count.as_mut() else {
            return;
        };

        let mut decrements: FastHashMap<H256, i64> = FastHashMap::default();
        for hash in pending {
            *decrements.entry(hash).or_insert(0) += 1;
        }

        for (hash, count) in decrements {
            let remaining = counts.get(&hash).copied().unwrap_or(0) - count;
            if remaining <= 0 {
                counts.remove(&hash);
                self.store.delete(&hash);
            } else {
                counts.insert(hash, remaining);
            }
        }
    }
}
