//! Typed trie node model and the node codec.
//!
//! A node body is an RLP list: leaves and extensions are 2-item lists whose
//! first item is a compact-encoded path, branches are 17-item lists. Child
//! references follow the content-addressing rule: a child whose encoding is
//! shorter than 32 bytes is embedded inline, anything else is referenced by
//! its keccak256 digest.

use primitive_types::H256;
use tiny_keccak::{Hasher, Keccak};

use crate::data::Nibbles;

use super::rlp::{decode_list, RlpEncoder, RlpError, RlpItem};

/// Hash size (Keccak-256).
pub const HASH_SIZE: usize = 32;

/// The empty trie root hash, `keccak256(RLP(""))`.
pub const EMPTY_ROOT: H256 = H256([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
    0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
    0xb4, 0x21,
]);

/// Computes the Keccak-256 hash of `data`.
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; HASH_SIZE];
    hasher.finalize(&mut hash);
    H256(hash)
}

/// Node type in the trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// Absent node.
    Blank,
    /// Leaf node with a path suffix and a value.
    Leaf,
    /// Extension node compressing a shared path prefix.
    Extension,
    /// Branch node with 16 child slots and an optional value.
    Branch,
}

/// Reference to a child node.
///
/// A child whose RLP encoding is >= 32 bytes is referenced by its keccak256
/// digest; a shorter child is embedded inline as its raw encoding. The
/// distinction is preserved bit-for-bit through encode/decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChildRef {
    /// No child.
    Empty,
    /// Child referenced by the keccak256 digest of its encoding.
    Hash(H256),
    /// Child embedded inline as its raw RLP encoding.
    Inline(Vec<u8>),
}

impl ChildRef {
    /// Builds the reference for an encoded node body.
    pub fn from_encoded(encoded: Vec<u8>) -> Self {
        if encoded.len() >= HASH_SIZE {
            ChildRef::Hash(keccak256(&encoded))
        } else {
            ChildRef::Inline(encoded)
        }
    }

    /// True if this slot is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, ChildRef::Empty)
    }

    fn from_item(item: &RlpItem) -> Result<Self, RlpError> {
        match item {
            RlpItem::Str(bytes) if bytes.is_empty() => Ok(ChildRef::Empty),
            RlpItem::Str(bytes) if bytes.len() == HASH_SIZE => {
                Ok(ChildRef::Hash(H256::from_slice(bytes)))
            }
            RlpItem::List(raw) => Ok(ChildRef::Inline(raw.clone())),
            RlpItem::Str(_) => Err(RlpError::UnexpectedType),
        }
    }

    fn encode_to(&self, encoder: &mut RlpEncoder) {
        match self {
            ChildRef::Empty => encoder.encode_empty(),
            ChildRef::Hash(hash) => encoder.encode_bytes(hash.as_bytes()),
            ChildRef::Inline(raw) => encoder.encode_raw(raw),
        }
    }
}

impl Default for ChildRef {
    fn default() -> Self {
        ChildRef::Empty
    }
}

/// A node in the hexary trie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Absent node; encodes as the empty string.
    Blank,

    /// Leaf node: the remainder of a key and its value.
    Leaf {
        /// Remaining nibbles of the key.
        path: Nibbles,
        /// The value stored at this leaf.
        value: Vec<u8>,
    },

    /// Extension node: a shared path prefix and exactly one child.
    Extension {
        /// Shared path prefix (nibbles).
        path: Nibbles,
        /// Reference to the child node.
        child: ChildRef,
    },

    /// Branch node: one child slot per nibble, plus an optional value for a
    /// key terminating here.
    Branch {
        /// Children, one slot per nibble.
        children: Box<[ChildRef; 16]>,
        /// Value for a key ending at this branch.
        value: Option<Vec<u8>>,
    },
}

impl Node {
    /// Creates a leaf node.
    pub fn leaf(path: Nibbles, value: Vec<u8>) -> Self {
        Node::Leaf { path, value }
    }

    /// Creates an extension node.
    pub fn extension(path: Nibbles, child: ChildRef) -> Self {
        Node::Extension { path, child }
    }

    /// Creates an empty branch node.
    pub fn branch() -> Self {
        Node::Branch {
            children: Box::new(Default::default()),
            value: None,
        }
    }

    /// Returns the node type.
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Blank => NodeType::Blank,
            Node::Leaf { .. } => NodeType::Leaf,
            Node::Extension { .. } => NodeType::Extension,
            Node::Branch { .. } => NodeType::Branch,
        }
    }

    /// True for the blank node.
    pub fn is_blank(&self) -> bool {
        matches!(self, Node::Blank)
    }

    /// RLP encodes the node body.
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = RlpEncoder::new();
        match self {
            Node::Blank => encoder.encode_empty(),
            Node::Leaf { path, value } => encoder.encode_list(|e| {
                e.encode_bytes(&path.to_compact(true));
                e.encode_bytes(value);
            }),
            Node::Extension { path, child } => encoder.encode_list(|e| {
                e.encode_bytes(&path.to_compact(false));
                child.encode_to(e);
            }),
            Node::Branch { children, value } => encoder.encode_list(|e| {
                for child in children.iter() {
                    child.encode_to(e);
                }
                match value {
                    Some(v) => e.encode_bytes(v),
                    None => e.encode_empty(),
                }
            }),
        }
        encoder.into_bytes()
    }

    /// Decodes an RLP node body into a typed node.
    pub fn decode(raw: &[u8]) -> Result<Self, RlpError> {
        if raw.is_empty() || raw == [0x80] {
            return Ok(Node::Blank);
        }

        let items = decode_list(raw)?;
        match items.len() {
            2 => {
                let RlpItem::Str(compact) = &items[0] else {
                    return Err(RlpError::UnexpectedType);
                };
                let (path, is_leaf) = Nibbles::from_compact(compact);
                if is_leaf {
                    let RlpItem::Str(value) = &items[1] else {
                        return Err(RlpError::UnexpectedType);
                    };
                    Ok(Node::Leaf {
                        path,
                        value: value.clone(),
                    })
                } else {
                    Ok(Node::Extension {
                        path,
                        child: ChildRef::from_item(&items[1])?,
                    })
                }
            }
            17 => {
                let mut children: Box<[ChildRef; 16]> = Box::new(Default::default());
                for (slot, item) in children.iter_mut().zip(&items[..16]) {
                    *slot = ChildRef::from_item(item)?;
                }
                let RlpItem::Str(value) = &items[16] else {
                    return Err(RlpError::UnexpectedType);
                };
                let value = if value.is_empty() {
                    None
                } else {
                    Some(value.clone())
                };
                Ok(Node::Branch { children, value })
            }
            _ => Err(RlpError::UnexpectedType),
        }
    }

    /// Builds the annotated view of this node used by traversal and walkers.
    pub fn annotate(&self) -> AnnotatedNode {
        let (sub_segments, value, suffix) = match self {
            Node::Blank => (Vec::new(), None, Nibbles::new()),
            Node::Leaf { path, value } => (Vec::new(), Some(value.clone()), path.clone()),
            Node::Extension { path, .. } => (vec![path.clone()], None, Nibbles::new()),
            Node::Branch { children, value } => {
                let segments = children
                    .iter()
                    .enumerate()
                    .filter(|(_, child)| !child.is_empty())
                    .map(|(nibble, _)| Nibbles::from_raw(vec![nibble as u8]))
                    .collect();
                (segments, value.clone(), Nibbles::new())
            }
        };
        AnnotatedNode {
            sub_segments,
            value,
            suffix,
            raw: self.clone(),
        }
    }
}

/// A node annotated with the information a walker needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedNode {
    /// The nibble-sequence edges out of this node: one single-nibble
    /// segment per occupied branch slot, the full path for an extension,
    /// nothing for a leaf or blank node.
    pub sub_segments: Vec<Nibbles>,
    /// The terminal value if this node is a key terminus.
    pub value: Option<Vec<u8>>,
    /// For a leaf, its remaining nibble path.
    pub suffix: Nibbles,
    /// The decoded node body.
    pub raw: Node,
}

impl AnnotatedNode {
    /// The full key bytes of the value stored at this node, given the
    /// node's prefix from the root. `None` if the node holds no value.
    pub fn key_at(&self, prefix: &Nibbles) -> Option<Vec<u8>> {
        self.value
            .as_ref()
            .map(|_| prefix.join(&self.suffix).to_bytes())
    }
}
