//! Merkle proofs of inclusion and exclusion.
//!
//! A proof is the ordered sequence of hash-referenced node bodies on the
//! path from the root to a key's value, or to the divergence point that
//! shows the key absent. Nodes small enough to be inlined are not separate
//! proof elements; they appear expanded inside their parent's body.
//!
//! Verification rebuilds a throwaway store from the proof bodies and walks
//! it like any other trie: a digest that fails to resolve means the proof
//! does not link to the claimed root.

use primitive_types::H256;

use crate::data::nibbles::key_starts_with;
use crate::data::Nibbles;
use crate::store::{MemoryStore, ReadStore, WriteStore};

use super::node::{keccak256, ChildRef, Node};
use super::trie::{HexaryTrie, TrieError};

impl<S: ReadStore> HexaryTrie<S> {
    /// Collects the proof for `key`: the hash-referenced nodes from the
    /// root down to the key's value or to the point where the trie
    /// diverges from it.
    pub fn get_proof(&self, key: &[u8]) -> Result<Vec<Node>, TrieError> {
        let trie_key = Nibbles::from_bytes(key);
        let path = trie_key.as_slice();

        let mut proof = Vec::new();
        let mut current = ChildRef::Hash(self.root_hash());
        let mut consumed = 0;

        loop {
            let via_hash = matches!(current, ChildRef::Hash(_));
            let node = self.get_node(&current)?;
            if via_hash && !node.is_blank() {
                proof.push(node.clone());
            }

            current = match node {
                Node::Blank | Node::Leaf { .. } => break,
                Node::Extension {
                    path: ext_path,
                    child,
                } => {
                    if !key_starts_with(&path[consumed..], ext_path.as_slice()) {
                        break;
                    }
                    consumed += ext_path.len();
                    child
                }
                Node::Branch { children, .. } => {
                    if consumed == path.len() {
                        break;
                    }
                    let slot = path[consumed] as usize;
                    if children[slot].is_empty() {
                        break;
                    }
                    consumed += 1;
                    children[slot].clone()
                }
            };
        }

        Ok(proof)
    }
}

/// Verifies `proof` for `key` against `root_hash`.
///
/// Returns `Some(value)` for a valid inclusion proof, `None` for a valid
/// exclusion proof, and [`TrieError::InvalidProof`] when any referenced
/// digest has no matching body among the proof elements.
pub fn verify_proof(
    root_hash: H256,
    key: &[u8],
    proof: &[Node],
) -> Result<Option<Vec<u8>>, TrieError> {
    let mut store = MemoryStore::with_capacity(proof.len());
    for node in proof {
        if node.is_blank() {
            continue;
        }
        // proof bodies are stored by digest regardless of size, so the
        // walk can resolve every reference
        let encoded = node.encode();
        store.insert(keccak256(&encoded), encoded);
    }

    let trie = HexaryTrie::with_root(store, root_hash);
    trie.get(key).map_err(|err| match err {
        TrieError::MissingTrieNode { missing_hash, .. } => {
            TrieError::InvalidProof { missing_hash }
        }
        other => other,
    })
}
