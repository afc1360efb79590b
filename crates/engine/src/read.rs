//! Read path: `get()`, `list_keys()`, and `fold()`.
//!
//! A lookup resolves the key to a [`RecordPos`] through the index, then
//! preads the owning data file. The engine lock is held in shared mode, so
//! readers proceed in parallel; writers block only for the duration of an
//! append.

use datalog::{RecordPos, RecordType};

use crate::{Engine, Error, Files, Result};

impl Engine {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// * [`Error::EmptyKey`] for an empty key.
    /// * [`Error::KeyNotFound`] when the key is absent or tombstoned.
    /// * [`Error::DataFileNotFound`] when the index references a missing
    ///   file (directory tampering).
    /// * [`Error::Io`] on read failure, including a record that fails its
    ///   CRC check.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let files = self.files.read();
        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;
        self.value_at(&files, &pos)
    }

    /// Reads and decodes the record at `pos`, returning its value.
    pub(crate) fn value_at(&self, files: &Files, pos: &RecordPos) -> Result<Vec<u8>> {
        let data_file = match files.active.as_ref() {
            Some(active) if active.file_id() == pos.file_id => Some(active),
            _ => files.older.get(&pos.file_id),
        };
        let data_file = data_file.ok_or(Error::DataFileNotFound)?;

        let (record, _) = data_file.read_record(pos.offset)?;
        if record.rec_type == RecordType::Tombstone {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    /// All live keys in ascending order, snapshotted at call time.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        let mut iter = self.index.iterator(false);
        let mut keys = Vec::with_capacity(self.index.size());
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        iter.close();
        keys
    }

    /// Calls `f` with every live key-value pair in ascending key order,
    /// stopping early when `f` returns `false`.
    ///
    /// Holds the engine lock in shared mode for the whole traversal, so
    /// writes wait until it finishes.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Vec<u8>) -> bool,
    {
        let files = self.files.read();
        let mut iter = self.index.iterator(false);
        while iter.valid() {
            let value = self.value_at(&files, &iter.value())?;
            if !f(iter.key(), value) {
                break;
            }
            iter.next();
        }
        iter.close();
        Ok(())
    }
}
