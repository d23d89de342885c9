//! Basic usage of the hexary trie.

use hexary_db::{verify_proof, HexaryTrie, MemoryStore, Nibbles};

fn main() {
    let mut trie = HexaryTrie::new(MemoryStore::new());

    trie.set(b"my-key", b"some-value").unwrap();
    trie.set(b"my-other-key", b"another-value").unwrap();
    println!("root: {:x}", trie.root_hash());

    let value = trie.get(b"my-key").unwrap();
    println!("my-key -> {:?}", value.map(String::from_utf8));

    // walk the first level of the trie
    let root = trie.traverse(&Nibbles::new()).unwrap();
    println!("edges out of the root: {:?}", root.sub_segments);

    // prove a key against the root
    let proof = trie.get_proof(b"my-other-key").unwrap();
    let proven = verify_proof(trie.root_hash(), b"my-other-key", &proof).unwrap();
    println!("proven value: {:?}", proven.map(String::from_utf8));

    // batch several changes into one commit
    trie.squash_changes(|batch| {
        batch.set(b"third-key", b"third-value")?;
        batch.delete(b"my-key")?;
        Ok(())
    })
    .unwrap();
    println!("root after batch: {:x}", trie.root_hash());
}
