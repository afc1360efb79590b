//! Engine-level iterator: wraps an index cursor, applies the prefix filter,
//! and materializes values from the data files on demand.

use datalog::RecordPos;
use index::IndexIterator;

use crate::{Engine, IteratorOptions, Result};

/// Ordered, prefix-filtered cursor over the live keys of an [`Engine`].
///
/// The underlying index snapshot is taken at construction, so concurrent
/// writes do not move the cursor; `value()` reads the record fresh from its
/// data file. Callers should [`close`](Iter::close) when done to release
/// the snapshot.
pub struct Iter<'a> {
    engine: &'a Engine,
    index_iter: Box<dyn IndexIterator>,
    options: IteratorOptions,
}

impl Engine {
    /// Opens an iterator over the live keys, ascending by default,
    /// descending with `options.reverse`, restricted to `options.prefix`.
    pub fn new_iterator(&self, options: IteratorOptions) -> Iter<'_> {
        let index_iter = self.index.iterator(options.reverse);
        let mut iter = Iter {
            engine: self,
            index_iter,
            options,
        };
        iter.skip_to_prefix();
        iter
    }
}

impl Iter<'_> {
    /// Back to the first matching key (last when reverse).
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_prefix();
    }

    /// Positions on the first matching key `>= key` (forward) or `<= key`
    /// (reverse).
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_prefix();
    }

    /// Advances to the next matching key.
    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_prefix();
    }

    /// Whether the cursor currently points at an entry.
    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    /// Key under the cursor. Panics when not [`valid`](Iter::valid).
    pub fn key(&self) -> &[u8] {
        self.index_iter.key()
    }

    /// Position under the cursor. Panics when not [`valid`](Iter::valid).
    pub fn position(&self) -> RecordPos {
        self.index_iter.value()
    }

    /// Reads the value under the cursor from its data file. Tombstoned keys
    /// never appear here; the index does not contain them.
    pub fn value(&self) -> Result<Vec<u8>> {
        let files = self.engine.files.read();
        self.engine.value_at(&files, &self.index_iter.value())
    }

    /// Releases the snapshot (and, for the on-disk index back-end, its read
    /// transaction).
    pub fn close(&mut self) {
        self.index_iter.close();
    }

    fn skip_to_prefix(&mut self) {
        let prefix = &self.options.prefix;
        if prefix.is_empty() {
            return;
        }
        while self.index_iter.valid() && !self.index_iter.key().starts_with(prefix) {
            self.index_iter.next();
        }
    }
}
