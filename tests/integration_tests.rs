//! Integration tests for hexary_db.

use std::collections::HashSet;

use hex_literal::hex;
use primitive_types::H256;

use hexary_db::{
    keccak256, verify_proof, HexaryTrie, MemoryStore, Nibbles, NodeIterator, ReadStore,
    TrieError, WriteStore, EMPTY_ROOT, HASH_SIZE,
};

/// Every digest reachable from the current root, the root included (root
/// bodies are persisted even when small enough to inline).
fn reachable_bodies<S: ReadStore>(trie: &HexaryTrie<S>) -> HashSet<H256> {
    let mut reachable = HashSet::new();
    if trie.is_empty() {
        return reachable;
    }
    reachable.insert(trie.root_hash());
    for entry in NodeIterator::new(trie) {
        let (_, node) = entry.unwrap();
        let encoded = node.raw.encode();
        if encoded.len() >= HASH_SIZE {
            reachable.insert(keccak256(&encoded));
        }
    }
    reachable
}

#[test]
fn test_empty_trie_has_well_known_root() {
    let trie = HexaryTrie::new(MemoryStore::new());
    assert_eq!(
        trie.root_hash(),
        H256(hex!(
            "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
        ))
    );
    // the empty root body is never persisted
    assert_eq!(trie.store().len(), 0);
}

#[test]
fn test_known_ethereum_root_vector() {
    let mut trie = HexaryTrie::new(MemoryStore::new());
    trie.set(b"doe", b"reindeer").unwrap();
    trie.set(b"dog", b"puppy").unwrap();
    trie.set(b"dogglesworth", b"cat").unwrap();

    assert_eq!(
        trie.root_hash(),
        H256(hex!(
            "8aad789dff2f538bca5d8ea56e8abe10f4c7ba3a5dea95fea4cd6e7c3a1168d3"
        ))
    );
}

#[test]
fn test_single_entry_root_vector() {
    let mut trie = HexaryTrie::new(MemoryStore::new());
    trie.set(b"A", b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        .unwrap();

    assert_eq!(
        trie.root_hash(),
        H256(hex!(
            "d23786fb4a010da3ce639d66d5e904a11dbc02746d1ce25029e53290cabf28ab"
        ))
    );
}

#[test]
fn test_small_root_body_is_persisted() {
    let mut trie = HexaryTrie::new(MemoryStore::new());
    trie.set(b"k", b"v").unwrap();

    // the root leaf encodes under 32 bytes but still gets its own entry
    assert_eq!(trie.store().len(), 1);
    assert!(trie.store().contains(&trie.root_hash()));
    assert_eq!(trie.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_two_key_scenario_shapes_and_deletion() {
    let mut trie = HexaryTrie::new(MemoryStore::new());
    trie.set(b"my-key", b"some-value").unwrap();
    let single_root = trie.root_hash();

    trie.set(b"my-other-key", b"another-value").unwrap();

    // the root is an extension over the seven shared nibbles
    let root = trie.traverse(&Nibbles::new()).unwrap();
    assert_eq!(
        root.sub_segments,
        vec![Nibbles::from_raw(vec![0x6, 0xd, 0x7, 0x9, 0x2, 0xd, 0x6])]
    );

    // beneath it, a branch splits the keys at slots 0xb and 0xf
    let branch = trie.traverse(&root.sub_segments[0]).unwrap();
    assert_eq!(
        branch.sub_segments,
        vec![Nibbles::from_raw(vec![0xb]), Nibbles::from_raw(vec![0xf])]
    );

    let left = trie
        .traverse(&root.sub_segments[0].join(&branch.sub_segments[0]))
        .unwrap();
    assert_eq!(left.value, Some(b"some-value".to_vec()));
    let right = trie
        .traverse(&root.sub_segments[0].join(&branch.sub_segments[1]))
        .unwrap();
    assert_eq!(right.value, Some(b"another-value".to_vec()));

    // removing the second key restores the single-key root exactly
    trie.delete(b"my-other-key").unwrap();
    assert_eq!(trie.root_hash(), single_root);
}

#[test]
fn test_shared_prefix_proofs_are_two_nodes() {
    let mut trie = HexaryTrie::new(MemoryStore::new());
    trie.set(b"my-key", b"some-value").unwrap();
    trie.set(b"my-other-key", b"another-value").unwrap();
    let root = trie.root_hash();

    for (key, value) in [
        (&b"my-key"[..], &b"some-value"[..]),
        (&b"my-other-key"[..], &b"another-value"[..]),
    ] {
        let proof = trie.get_proof(key).unwrap();
        assert_eq!(proof.len(), 2);
        assert_eq!(verify_proof(root, key, &proof).unwrap(), Some(value.to_vec()));
    }
}

#[test]
fn test_full_workflow_with_squash_and_pruning() {
    let mut trie = HexaryTrie::with_pruning(MemoryStore::new(), EMPTY_ROOT);

    trie.squash_changes(|batch| {
        for i in 0u32..32 {
            batch.set(format!("account-{i}").as_bytes(), format!("balance-{i}").as_bytes())?;
        }
        Ok(())
    })
    .unwrap();

    let checkpoint = trie.root_hash();

    trie.squash_changes(|batch| {
        for i in 0u32..16 {
            batch.delete(format!("account-{i}").as_bytes())?;
        }
        for i in 16u32..32 {
            batch.set(format!("account-{i}").as_bytes(), b"updated")?;
        }
        Ok(())
    })
    .unwrap();

    assert_ne!(trie.root_hash(), checkpoint);
    for i in 0u32..16 {
        assert_eq!(trie.get(format!("account-{i}").as_bytes()).unwrap(), None);
    }
    for i in 16u32..32 {
        assert_eq!(
            trie.get(format!("account-{i}").as_bytes()).unwrap(),
            Some(b"updated".to_vec())
        );
    }

    // every surviving key is enumerable in order
    let trie_keys: Vec<Vec<u8>> = NodeIterator::new(&trie)
        .keys()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(trie_keys.len(), 16);
    assert!(trie_keys.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_squash_rollback_restores_root_and_overlay() {
    let mut store = MemoryStore::new();
    let mut setup = HexaryTrie::new(&mut store);
    for i in 0u32..48 {
        setup
            .set(format!("key-{i}").as_bytes(), format!("value-{i}").as_bytes())
            .unwrap();
    }
    let root = setup.root_hash();
    drop(setup);

    let victim = *store
        .iter()
        .map(|(hash, _)| hash)
        .find(|hash| **hash != root)
        .unwrap();
    store.delete(&victim);
    let resident_before = store.len();

    let mut trie = HexaryTrie::with_root(&mut store, root);
    let result: Result<(), TrieError> = trie.squash_changes(|batch| {
        for i in 0u32..48 {
            batch.set(format!("key-{i}").as_bytes(), b"overwritten")?;
        }
        Ok(())
    });

    match result {
        Err(TrieError::MissingTrieNode { missing_hash, .. }) => {
            assert_eq!(missing_hash, victim)
        }
        other => panic!("expected a missing-node fault, got {other:?}"),
    }
    assert_eq!(trie.root_hash(), root);
    drop(trie);
    assert_eq!(store.len(), resident_before);
}

#[test]
fn test_metrics_observe_trie_activity() {
    let mut trie = HexaryTrie::new(MemoryStore::new());
    for i in 0u32..8 {
        trie.set(format!("key-{i}").as_bytes(), b"value").unwrap();
    }
    let _ = trie.get(b"key-3").unwrap();

    let metrics = trie.store().metrics();
    assert!(metrics.writes() > 0);
    assert!(metrics.reads() > 0);
    assert_eq!(metrics.deletes(), 0);
}

#[test]
fn test_squash_rollback_preserves_prune_counts() {
    let mut trie = HexaryTrie::with_pruning(MemoryStore::new(), EMPTY_ROOT);
    for i in 0u32..32 {
        trie.set(format!("account-{i}").as_bytes(), format!("balance-{i}").as_bytes())
            .unwrap();
    }
    let root = trie.root_hash();

    // supersede every live body inside a batch, then fault before commit
    let result: Result<(), TrieError> = trie.squash_changes(|batch| {
        for i in 0u32..32 {
            batch.set(format!("account-{i}").as_bytes(), b"rewritten")?;
        }
        Err(TrieError::BadTrieInvariant("forced fault".into()))
    });
    assert!(result.is_err());
    assert_eq!(trie.root_hash(), root);

    // replay the rewrites for real, then supersede them once more; counts
    // inherited from the discarded overlay would leave the replayed bodies
    // overprotected and strand them in the store
    for i in 0u32..32 {
        trie.set(format!("account-{i}").as_bytes(), b"rewritten").unwrap();
    }
    for i in 0u32..32 {
        trie.set(format!("account-{i}").as_bytes(), b"rewritten-again")
            .unwrap();
    }
    for i in 0u32..32 {
        assert_eq!(
            trie.get(format!("account-{i}").as_bytes()).unwrap(),
            Some(b"rewritten-again".to_vec())
        );
    }

    let resident: HashSet<H256> = trie.store().iter().map(|(hash, _)| *hash).collect();
    assert_eq!(resident, reachable_bodies(&trie));
}

#[test]
fn test_squash_rollback_keeps_shared_bodies_protected() {
    // three keys diverging on their first nibble, identical afterwards, so
    // all three branch slots reference one content-addressed leaf body
    let value = [0x5a_u8; 40];
    let keys: [&[u8]; 3] = [&[0x17, 0x77], &[0x27, 0x77], &[0x37, 0x77]];

    let mut trie = HexaryTrie::with_pruning(MemoryStore::new(), EMPTY_ROOT);
    for key in keys {
        trie.set(key, &value).unwrap();
    }

    // the batch releases all three references to the shared body, then
    // faults; the rollback must also restore its reference count
    let result: Result<(), TrieError> = trie.squash_changes(|batch| {
        for key in keys {
            batch.delete(key)?;
        }
        Err(TrieError::BadTrieInvariant("forced fault".into()))
    });
    assert!(result.is_err());

    // dropping one key must leave the shared body alive for the other two
    trie.delete(keys[0]).unwrap();
    assert_eq!(trie.get(keys[1]).unwrap(), Some(value.to_vec()));
    assert_eq!(trie.get(keys[2]).unwrap(), Some(value.to_vec()));

    let resident: HashSet<H256> = trie.store().iter().map(|(hash, _)| *hash).collect();
    assert_eq!(resident, reachable_bodies(&trie));
}
