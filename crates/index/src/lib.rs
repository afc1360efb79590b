//! # index — In-memory key directory
//!
//! Maps every live key to the [`RecordPos`] of its most recent record. Three
//! back-ends sit behind one capability set:
//!
//! | Back-end | Storage | Ordering |
//! |----------|---------|----------|
//! | [`IndexKind::OrderedTree`] | `BTreeMap` under an `RwLock` | byte-lexicographic |
//! | [`IndexKind::Radix`] | radix trie under an `RwLock` | byte-lexicographic |
//! | [`IndexKind::OnDiskBTree`] | redb B+ tree (`bptree-index` file) | byte-lexicographic |
//!
//! Mutations on the in-memory back-ends take a write lock; lookups and
//! iterator construction take a read lock. Iterators materialize a
//! key-ordered snapshot at construction so callers never iterate under a
//! lock. The on-disk back-end runs every mutation in a write transaction and
//! every lookup in a read transaction; its iterator keeps the read
//! transaction alive until [`IndexIterator::close`].
//!
//! Failures inside the embedded on-disk store are unrecoverable and panic;
//! the in-memory back-ends are infallible.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};

use datalog::RecordPos;

mod bptree;

pub use bptree::{BPTreeIndexer, BPTREE_INDEX_FILE_NAME};

/// Which index back-end an engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexKind {
    /// Ordered in-memory tree. The default.
    #[default]
    OrderedTree,
    /// In-memory radix trie.
    Radix,
    /// Persistent B+ tree stored next to the data files.
    OnDiskBTree,
}

/// Capability set every index back-end provides.
pub trait Indexer: Send + Sync {
    /// Inserts or replaces `key`, returning the displaced position if the
    /// key already existed.
    fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos>;

    fn get(&self, key: &[u8]) -> Option<RecordPos>;

    /// Removes `key`, returning the displaced position and whether the key
    /// was present.
    fn delete(&self, key: &[u8]) -> (Option<RecordPos>, bool);

    /// Number of live keys.
    fn size(&self) -> usize;

    /// A key-ordered iterator over a snapshot of the index. Ascending by
    /// default, descending when `reverse`.
    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator>;

    /// Releases back-end resources. In-memory back-ends have none; the
    /// on-disk store flushes on drop.
    fn close(&self);
}

/// Cursor over an index snapshot.
///
/// `key` and `value` panic when the cursor is not [`valid`](Self::valid).
pub trait IndexIterator {
    /// Back to the first entry (last when reverse).
    fn rewind(&mut self);

    /// Positions on the first key `>= key` (forward) or `<= key` (reverse).
    fn seek(&mut self, key: &[u8]);

    fn next(&mut self);

    fn valid(&self) -> bool;

    fn key(&self) -> &[u8];

    fn value(&self) -> RecordPos;

    /// Releases the snapshot (and, for the on-disk back-end, its read
    /// transaction).
    fn close(&mut self);
}

/// Constructs the back-end selected by `kind`. `dir_path` is only used by
/// the on-disk back-end, which stores its tree next to the data files.
pub fn new_indexer(kind: IndexKind, dir_path: &Path) -> Box<dyn Indexer> {
    match kind {
        IndexKind::OrderedTree => Box::new(BTreeIndexer::new()),
        IndexKind::Radix => Box::new(RadixIndexer::new()),
        IndexKind::OnDiskBTree => Box::new(BPTreeIndexer::new(dir_path)),
    }
}

/// Snapshot-backed cursor shared by every back-end. Items are stored in
/// iteration order, so `reverse` only affects how `seek` compares.
pub(crate) struct SnapshotIter {
    items: Vec<(Vec<u8>, RecordPos)>,
    at: usize,
    reverse: bool,
}

impl SnapshotIter {
    pub(crate) fn new(mut items: Vec<(Vec<u8>, RecordPos)>, reverse: bool) -> Self {
        if reverse {
            items.reverse();
        }
        Self {
            items,
            at: 0,
            reverse,
        }
    }
}

impl IndexIterator for SnapshotIter {
    fn rewind(&mut self) {
        self.at = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.at = if self.reverse {
            // Items run descending: skip everything greater than `key`.
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        self.at += 1;
    }

    fn valid(&self) -> bool {
        self.at < self.items.len()
    }

    fn key(&self) -> &[u8] {
        &self.items[self.at].0
    }

    fn value(&self) -> RecordPos {
        self.items[self.at].1
    }

    fn close(&mut self) {
        self.items = Vec::new();
        self.at = 0;
    }
}

/// Ordered in-memory tree back-end.
pub struct BTreeIndexer {
    tree: RwLock<BTreeMap<Vec<u8>, RecordPos>>,
}

impl BTreeIndexer {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTreeIndexer {
    fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos> {
        self.tree.write().insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<RecordPos> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> (Option<RecordPos>, bool) {
        let old = self.tree.write().remove(key);
        let found = old.is_some();
        (old, found)
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let items = self
            .tree
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Box::new(SnapshotIter::new(items, reverse))
    }

    fn close(&self) {}
}

/// Radix-trie back-end. Same contract as the ordered tree; the trie keeps
/// its entries in byte order, so iteration needs no extra sort.
pub struct RadixIndexer {
    tree: RwLock<Trie<Vec<u8>, RecordPos>>,
}

impl RadixIndexer {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Trie::new()),
        }
    }
}

impl Default for RadixIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for RadixIndexer {
    fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos> {
        self.tree.write().insert(key, pos)
    }

    fn get(&self, key: &[u8]) -> Option<RecordPos> {
        self.tree.read().get(&key.to_vec()).copied()
    }

    fn delete(&self, key: &[u8]) -> (Option<RecordPos>, bool) {
        let old = self.tree.write().remove(&key.to_vec());
        let found = old.is_some();
        (old, found)
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let items = self
            .tree
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Box::new(SnapshotIter::new(items, reverse))
    }

    fn close(&self) {}
}
