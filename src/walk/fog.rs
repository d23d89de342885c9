//! Unexplored-prefix bookkeeping for external trie walks.
//!
//! [`HexaryTrieFog`] tracks which key prefixes of a trie remain unexplored.
//! It is a pure value: it knows nothing about any actual trie, and every
//! change returns a new fog. A walker pairs it with `traverse`, exploring
//! whichever prefix the fog suggests and lifting the fog with the node's
//! sub-segments.

use std::collections::BTreeSet;
use std::ops::Bound::{Excluded, Included, Unbounded};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Nibbles;

/// Fog errors and completion signals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FogError {
    /// No unexplored prefixes remain anywhere.
    #[error("no unexplored prefixes remain")]
    PerfectVisibility,

    /// No unexplored prefixes remain at or to the right of the key.
    #[error("no unexplored prefixes remain to the right of {key}")]
    FullDirectionalVisibility { key: Nibbles },

    /// Malformed serialized fog.
    #[error("malformed fog serialization: {0}")]
    Serialization(String),
}

/// The set of unexplored prefixes of a trie walk.
///
/// A new fog knows nothing: its only unexplored prefix is the empty one.
/// No unexplored prefix is ever a prefix of another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexaryTrieFog {
    unexplored: BTreeSet<Nibbles>,
}

impl HexaryTrieFog {
    /// Creates a fog covering the whole trie.
    pub fn new() -> Self {
        let mut unexplored = BTreeSet::new();
        unexplored.insert(Nibbles::new());
        HexaryTrieFog { unexplored }
    }

    /// True when nothing is left to explore.
    pub fn is_complete(&self) -> bool {
        self.unexplored.is_empty()
    }

    /// Number of unexplored prefixes.
    pub fn len(&self) -> usize {
        self.unexplored.len()
    }

    /// True when nothing is left to explore.
    pub fn is_empty(&self) -> bool {
        self.unexplored.is_empty()
    }

    /// Lifts the fog from `prefix`, leaving `prefix + segment` unexplored
    /// for each sub-segment. Exploring with no sub-segments marks the
    /// prefix fully explored. Exploring a prefix that is already absent is
    /// a no-op.
    ///
    /// # Panics
    /// Panics when the sub-segments contain duplicates or one segment is a
    /// prefix of another; such segments never come out of a single node.
    pub fn explore(&self, prefix: &Nibbles, sub_segments: &[Nibbles]) -> Self {
        for (index, segment) in sub_segments.iter().enumerate() {
            for other in &sub_segments[index + 1..] {
                assert!(
                    segment != other,
                    "duplicate sub-segment {segment} in explore"
                );
                assert!(
                    !segment.starts_with(other) && !other.starts_with(segment),
                    "sub-segment {segment} overlaps {other} in explore"
                );
            }
        }

        let mut unexplored = self.unexplored.clone();
        if !unexplored.remove(prefix) {
            return HexaryTrieFog { unexplored };
        }
        for segment in sub_segments {
            unexplored.insert(prefix.join(segment));
        }
        HexaryTrieFog { unexplored }
    }

    /// Marks each of the given prefixes fully explored. Equivalent to
    /// exploring each with no sub-segments.
    pub fn mark_all_complete(&self, prefixes: &[Nibbles]) -> Self {
        let mut unexplored = self.unexplored.clone();
        for prefix in prefixes {
            unexplored.remove(prefix);
        }
        HexaryTrieFog { unexplored }
    }

    /// The unexplored prefix nearest to `key` in nibble-lexicographic
    /// distance. Ties between the left and right neighbor go left.
    pub fn nearest_unknown(&self, key: &Nibbles) -> Result<Nibbles, FogError> {
        let left = self.unexplored.range((Unbounded, Included(key))).next_back();
        let right = self.unexplored.range((Excluded(key), Unbounded)).next();

        match (left, right) {
            (None, None) => Err(FogError::PerfectVisibility),
            (Some(left), None) => Ok(left.clone()),
            (None, Some(right)) => Ok(right.clone()),
            (Some(left), Some(right)) => {
                if prefix_distance(left, key) <= prefix_distance(key, right) {
                    Ok(left.clone())
                } else {
                    Ok(right.clone())
                }
            }
        }
    }

    /// The smallest unexplored prefix at or to the right of `key`. A
    /// prefix of `key` itself counts: exploring it uncovers the key.
    pub fn nearest_right(&self, key: &Nibbles) -> Result<Nibbles, FogError> {
        let left = self.unexplored.range((Unbounded, Included(key))).next_back();
        match left {
            None => self
                .unexplored
                .iter()
                .next()
                .cloned()
                .ok_or(FogError::PerfectVisibility),
            Some(left) if key.starts_with(left) => Ok(left.clone()),
            Some(_) => self
                .unexplored
                .range((Excluded(key), Unbounded))
                .next()
                .cloned()
                .ok_or_else(|| FogError::FullDirectionalVisibility { key: key.clone() }),
        }
    }

    /// Serializes the fog to bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, FogError> {
        bincode::serialize(self).map_err(|err| FogError::Serialization(err.to_string()))
    }

    /// Restores a fog from [`serialize`](Self::serialize) output.
    pub fn deserialize(encoded: &[u8]) -> Result<Self, FogError> {
        bincode::deserialize(encoded).map_err(|err| FogError::Serialization(err.to_string()))
    }
}

impl Default for HexaryTrieFog {
    fn default() -> Self {
        Self::new()
    }
}

/// Distance from `low` to `high` as a sequence of per-nibble differences,
/// compared lexicographically. Where one key is exhausted, the low side
/// fills with 15 and the high side with 0, so a longer low key is "almost
/// there" and a longer high key adds almost nothing.
///
/// `high` must not be smaller than `low`, or the first differences can go
/// negative and the comparison is meaningless.
fn prefix_distance(low: &Nibbles, high: &Nibbles) -> Vec<i16> {
    let len = low.len().max(high.len());
    (0..len)
        .map(|index| {
            let low_nibble = low.get(index).map(i16::from).unwrap_or(15);
            let high_nibble = high.get(index).map(i16::from).unwrap_or(0);
            high_nibble - low_nibble
        })
        .collect()
}
