//! Node store adapters.
//!
//! The trie reads and writes node bodies through the [`ReadStore`] and
//! [`WriteStore`] traits. [`MemoryStore`] is the in-memory implementation;
//! [`ScratchStore`] stages a batch of changes over another store.

mod metrics;
mod node_store;
mod scratch;

pub use metrics::StoreMetrics;
pub use node_store::{MemoryStore, ReadStore, WriteStore};
pub use scratch::ScratchStore;

pub(crate) use node_store::FastHashMap;
