//! # hexary_db
//!
//! A content-addressed hexary Merkle Patricia Trie.
//!
//! Keys are arbitrary byte strings, values are non-empty byte strings, and
//! every mutation deterministically updates a 32-byte root digest that
//! commits to the complete map. Node bodies live in a pluggable store,
//! keyed by the keccak256 digest of their RLP encoding; bodies shorter
//! than 32 bytes are embedded in their parent instead.
//!
//! ## Modules
//!
//! - `data` - Nibble sequences and the compact path codec
//! - `merkle` - Node model, trie engine, proofs, and iteration
//! - `store` - Node store traits, in-memory store, batch overlay
//! - `walk` - Fog and frontier cache for external trie walks
//!
//! ## Example
//!
//! ```
//! use hexary_db::{HexaryTrie, MemoryStore};
//!
//! let mut trie = HexaryTrie::new(MemoryStore::new());
//! trie.set(b"my-key", b"some-value").unwrap();
//! assert_eq!(trie.get(b"my-key").unwrap(), Some(b"some-value".to_vec()));
//! ```

pub mod data;
pub mod merkle;
pub mod store;
pub mod walk;

pub use data::Nibbles;
pub use merkle::{
    keccak256, verify_proof, AnnotatedNode, ChildRef, HexaryTrie, Node, NodeIterator, NodeType,
    TrieError, EMPTY_ROOT, HASH_SIZE,
};
pub use store::{MemoryStore, ReadStore, ScratchStore, StoreMetrics, WriteStore};
pub use walk::{FogError, HexaryTrieFog, TrieFrontierCache};
