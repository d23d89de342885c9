//! The Merkle Patricia Trie: node model, engine, proofs, and iteration.

pub mod iter;
pub mod node;
pub mod proof;
pub mod rlp;
pub mod trie;

#[cfg(test)]
mod tests;

pub use iter::NodeIterator;
pub use node::{keccak256, AnnotatedNode, ChildRef, Node, NodeType, EMPTY_ROOT, HASH_SIZE};
pub use proof::verify_proof;
pub use rlp::{RlpEncoder, RlpError};
pub use trie::{HexaryTrie, TrieError};
