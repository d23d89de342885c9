//! Property-based tests for the trie engine.

#[cfg(test)]
mod proptest_tests {
    use std::collections::{BTreeMap, HashSet};

    use primitive_types::H256;
    use proptest::prelude::*;

    use crate::data::Nibbles;
    use crate::merkle::node::{ChildRef, Node, EMPTY_ROOT};
    use crate::merkle::proof::verify_proof;
    use crate::merkle::trie::HexaryTrie;
    use crate::store::MemoryStore;

    fn entry_strategy() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<u8>(), 1..8),
                proptest::collection::vec(any::<u8>(), 1..48),
            ),
            1..24,
        )
    }

    fn build_trie(entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> HexaryTrie<MemoryStore> {
        let mut trie = HexaryTrie::new(MemoryStore::new());
        for (key, value) in entries {
            trie.set(key, value).unwrap();
        }
        trie
    }

    /// Every digest reachable from the current root, the root included.
    fn reachable_hashes(trie: &HexaryTrie<MemoryStore>) -> HashSet<H256> {
        let mut reachable = HashSet::new();
        if trie.is_empty() {
            return reachable;
        }
        let mut pending = vec![ChildRef::Hash(trie.root_hash())];
        while let Some(child_ref) = pending.pop() {
            if let ChildRef::Hash(hash) = &child_ref {
                if *hash == EMPTY_ROOT || !reachable.insert(*hash) {
                    continue;
                }
            }
            match trie.get_node(&child_ref).unwrap() {
                Node::Extension { child, .. } => pending.push(child),
                Node::Branch { children, .. } => {
                    pending.extend(children.iter().filter(|c| !c.is_empty()).cloned())
                }
                Node::Leaf { .. } | Node::Blank => {}
            }
        }
        reachable
    }

    proptest! {
        #[test]
        fn set_then_get_roundtrip(entries in entry_strategy()) {
            let entries: BTreeMap<_, _> = entries.into_iter().collect();
            let trie = build_trie(&entries);

            for (key, value) in &entries {
                prop_assert_eq!(trie.get(key).unwrap(), Some(value.clone()));
                prop_assert!(trie.exists(key).unwrap());
            }
        }

        #[test]
        fn root_is_insertion_order_independent(entries in entry_strategy()) {
            let entries: BTreeMap<_, _> = entries.into_iter().collect();

            let mut forward = HexaryTrie::new(MemoryStore::new());
            for (key, value) in &entries {
                forward.set(key, value).unwrap();
            }

            let mut backward = HexaryTrie::new(MemoryStore::new());
            for (key, value) in entries.iter().rev() {
                backward.set(key, value).unwrap();
            }

            prop_assert_eq!(forward.root_hash(), backward.root_hash());
        }

        #[test]
        fn delete_restores_root_without_key(entries in entry_strategy()) {
            let entries: BTreeMap<_, _> = entries.into_iter().collect();
            let (victim, _) = entries.iter().next().map(|(k, v)| (k.clone(), v.clone())).unwrap();

            let mut without: BTreeMap<_, _> = entries.clone();
            without.remove(&victim);
            let reference = build_trie(&without);

            let mut trie = build_trie(&entries);
            trie.delete(&victim).unwrap();

            prop_assert_eq!(trie.get(&victim).unwrap(), None);
            prop_assert_eq!(trie.root_hash(), reference.root_hash());
        }

        #[test]
        fn set_empty_value_equals_delete(entries in entry_strategy()) {
            let entries: BTreeMap<_, _> = entries.into_iter().collect();
            let (victim, _) = entries.iter().next().map(|(k, v)| (k.clone(), v.clone())).unwrap();

            let mut by_delete = build_trie(&entries);
            by_delete.delete(&victim).unwrap();

            let mut by_empty_set = build_trie(&entries);
            by_empty_set.set(&victim, b"").unwrap();

            prop_assert_eq!(by_delete.root_hash(), by_empty_set.root_hash());
            prop_assert_eq!(by_delete.store(), by_empty_set.store());
        }

        #[test]
        fn proof_verifies_to_get(entries in entry_strategy(), probe in proptest::collection::vec(any::<u8>(), 1..8)) {
            let entries: BTreeMap<_, _> = entries.into_iter().collect();
            let trie = build_trie(&entries);
            let root = trie.root_hash();

            // a present key and an arbitrary probe key
            let present = entries.keys().next().unwrap();
            for key in [present.as_slice(), probe.as_slice()] {
                let proof = trie.get_proof(key).unwrap();
                let proven = verify_proof(root, key, &proof).unwrap();
                prop_assert_eq!(proven, trie.get(key).unwrap());
            }
        }

        #[test]
        fn pruned_trie_matches_and_keeps_only_reachable(entries in entry_strategy()) {
            let entries: BTreeMap<_, _> = entries.into_iter().collect();

            let mut plain = HexaryTrie::new(MemoryStore::new());
            let mut pruned = HexaryTrie::with_pruning(MemoryStore::new(), EMPTY_ROOT);

            for (key, value) in &entries {
                plain.set(key, value).unwrap();
                pruned.set(key, value).unwrap();
            }
            for key in entries.keys().step_by(2) {
                plain.delete(key).unwrap();
                pruned.delete(key).unwrap();
            }

            prop_assert_eq!(plain.root_hash(), pruned.root_hash());

            let reachable = reachable_hashes(&pruned);
            let resident: HashSet<H256> = pruned.store().iter().map(|(hash, _)| *hash).collect();
            prop_assert_eq!(resident, reachable);
        }

        #[test]
        fn nibble_bytes_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
            prop_assert_eq!(Nibbles::from_bytes(&bytes).to_bytes(), bytes);
        }

        #[test]
        fn compact_codec_roundtrip(
            nibbles in proptest::collection::vec(0u8..16, 0..32),
            is_leaf in any::<bool>(),
        ) {
            let path = Nibbles::from_raw(nibbles);
            let encoded = path.to_compact(is_leaf);
            let (decoded, decoded_leaf) = Nibbles::from_compact(&encoded);
            prop_assert_eq!(decoded, path);
            prop_assert_eq!(decoded_leaf, is_leaf);
        }

        #[test]
        fn node_codec_roundtrip(
            path in proptest::collection::vec(0u8..16, 1..16),
            value in proptest::collection::vec(any::<u8>(), 1..48),
        ) {
            let leaf = Node::leaf(Nibbles::from_raw(path.clone()), value.clone());
            prop_assert_eq!(Node::decode(&leaf.encode()).unwrap(), leaf);

            let ext = Node::extension(
                Nibbles::from_raw(path),
                ChildRef::Hash(crate::merkle::keccak256(&value)),
            );
            prop_assert_eq!(Node::decode(&ext.encode()).unwrap(), ext);
        }
    }
}
