use std::fmt::Display;
use std::path::Path;

use redb::{Database, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition};

use datalog::{decode_record_pos, encode_record_pos, RecordPos};

use crate::{IndexIterator, Indexer, SnapshotIter};

/// File holding the persistent index, next to the data files.
pub const BPTREE_INDEX_FILE_NAME: &str = "bptree-index";

const INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ember-index");

/// On-disk B+ tree back-end over a single redb table.
///
/// Unlike the in-memory back-ends, this index survives restarts on its own,
/// so engines using it skip hint and data-file replay at open. Store
/// failures are treated as unrecoverable and panic.
pub struct BPTreeIndexer {
    db: Database,
}

fn unrecoverable<T, E: Display>(res: Result<T, E>, op: &str) -> T {
    match res {
        Ok(v) => v,
        Err(e) => panic!("on-disk index: {op} failed: {e}"),
    }
}

impl BPTreeIndexer {
    /// Opens (or creates) the index store in `dir_path` and makes sure the
    /// table exists so later read transactions never miss it.
    pub fn new(dir_path: &Path) -> Self {
        let db = unrecoverable(
            Database::create(dir_path.join(BPTREE_INDEX_FILE_NAME)),
            "open",
        );
        let txn = unrecoverable(db.begin_write(), "begin write");
        unrecoverable(txn.open_table(INDEX_TABLE), "create table");
        unrecoverable(txn.commit(), "commit");
        Self { db }
    }
}

impl Indexer for BPTreeIndexer {
    fn put(&self, key: Vec<u8>, pos: RecordPos) -> Option<RecordPos> {
        let txn = unrecoverable(self.db.begin_write(), "begin write");
        let old = {
            let mut table = unrecoverable(txn.open_table(INDEX_TABLE), "open table");
            let encoded = encode_record_pos(&pos);
            let prev = unrecoverable(table.insert(key.as_slice(), encoded.as_slice()), "put");
            prev.and_then(|guard| decode_record_pos(guard.value()))
        };
        unrecoverable(txn.commit(), "commit");
        old
    }

    fn get(&self, key: &[u8]) -> Option<RecordPos> {
        let txn = unrecoverable(self.db.begin_read(), "begin read");
        let table = unrecoverable(txn.open_table(INDEX_TABLE), "open table");
        unrecoverable(table.get(key), "get").and_then(|guard| decode_record_pos(guard.value()))
    }

    fn delete(&self, key: &[u8]) -> (Option<RecordPos>, bool) {
        let txn = unrecoverable(self.db.begin_write(), "begin write");
        let old = {
            let mut table = unrecoverable(txn.open_table(INDEX_TABLE), "open table");
            let removed = unrecoverable(table.remove(key), "delete");
            removed.and_then(|guard| decode_record_pos(guard.value()))
        };
        unrecoverable(txn.commit(), "commit");
        let found = old.is_some();
        (old, found)
    }

    fn size(&self) -> usize {
        let txn = unrecoverable(self.db.begin_read(), "begin read");
        let table = unrecoverable(txn.open_table(INDEX_TABLE), "open table");
        unrecoverable(table.len(), "len") as usize
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let txn = unrecoverable(self.db.begin_read(), "begin read");
        let table = unrecoverable(txn.open_table(INDEX_TABLE), "open table");

        let mut items = Vec::with_capacity(unrecoverable(table.len(), "len") as usize);
        for entry in unrecoverable(table.iter(), "iterate") {
            let (k, v) = unrecoverable(entry, "iterate");
            let pos = decode_record_pos(v.value())
                .unwrap_or_else(|| panic!("on-disk index: undecodable position entry"));
            items.push((k.value().to_vec(), pos));
        }

        Box::new(BPTreeIter {
            snapshot: SnapshotIter::new(items, reverse),
            txn: Some(txn),
        })
    }

    fn close(&self) {}
}

/// Iterator over the on-disk index. The backing read transaction stays open
/// until [`close`](IndexIterator::close) so the snapshot cannot be compacted
/// away underneath the cursor.
struct BPTreeIter {
    snapshot: SnapshotIter,
    txn: Option<ReadTransaction>,
}

impl IndexIterator for BPTreeIter {
    fn rewind(&mut self) {
        self.snapshot.rewind();
    }

    fn seek(&mut self, key: &[u8]) {
        self.snapshot.seek(key);
    }

    fn next(&mut self) {
        self.snapshot.next();
    }

    fn valid(&self) -> bool {
        self.snapshot.valid()
    }

    fn key(&self) -> &[u8] {
        self.snapshot.key()
    }

    fn value(&self) -> RecordPos {
        self.snapshot.value()
    }

    fn close(&mut self) {
        self.snapshot.close();
        self.txn.take();
    }
}
