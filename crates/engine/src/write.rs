//! Write path: `put()`, `delete()`, and the single-writer append protocol.
//!
//! Every mutation funnels through [`Engine::append_record`] while holding
//! the engine write lock: encode, roll the active file over if the record
//! would push it past `data_file_size`, append, and fsync according to the
//! durability options. The index is updated before the lock is released so
//! readers always observe the most recent completed write.

use std::sync::atomic::Ordering;

use fio::IoKind;

use datalog::{encode_key_with_seq, DataFile, LogRecord, RecordPos, RecordType, NON_TXN_SEQ};

use crate::{Engine, Error, Files, Result};

impl Engine {
    /// Stores `value` under `key`, durably per the engine's sync options.
    ///
    /// Overwriting a key leaves the old record on disk; its size is added to
    /// the reclaimable counter and a later merge drops it.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let record = LogRecord {
            key: encode_key_with_seq(key, NON_TXN_SEQ),
            value: value.to_vec(),
            rec_type: RecordType::Normal,
        };

        let mut files = self.files.write();
        let pos = self.append_record(&mut files, &record)?;
        if let Some(old) = self.index.put(key.to_vec(), pos) {
            self.reclaimable
                .fetch_add(u64::from(old.size), Ordering::SeqCst);
        }
        Ok(())
    }

    /// Removes `key` by appending a tombstone. Deleting an absent key is a
    /// success and writes nothing.
    ///
    /// Both the displaced record and the tombstone itself count as
    /// reclaimable: neither survives the next merge.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if self.index.get(key).is_none() {
            return Ok(());
        }

        let record = LogRecord {
            key: encode_key_with_seq(key, NON_TXN_SEQ),
            value: Vec::new(),
            rec_type: RecordType::Tombstone,
        };

        let mut files = self.files.write();
        let pos = self.append_record(&mut files, &record)?;
        self.reclaimable
            .fetch_add(u64::from(pos.size), Ordering::SeqCst);

        let (old, found) = self.index.delete(key);
        if !found {
            return Err(Error::IndexUpdateFailed);
        }
        if let Some(old) = old {
            self.reclaimable
                .fetch_add(u64::from(old.size), Ordering::SeqCst);
        }
        Ok(())
    }

    /// Convenience wrapper that takes the engine write lock around a single
    /// append. Used by merge, which feeds records into a staging engine.
    pub(crate) fn append_record_with_lock(&self, record: &LogRecord) -> Result<RecordPos> {
        let mut files = self.files.write();
        self.append_record(&mut files, record)
    }

    /// Appends one encoded record to the active file, rolling over first if
    /// it would exceed `data_file_size`. Caller holds the engine write lock.
    pub(crate) fn append_record(&self, files: &mut Files, record: &LogRecord) -> Result<RecordPos> {
        if files.active.is_none() {
            files.active = Some(DataFile::open(
                &self.options.dir_path,
                0,
                IoKind::Standard,
            )?);
        }

        let encoded = record.encode();
        let size = encoded.len() as u64;

        let rotate = files
            .active
            .as_ref()
            .map_or(false, |a| a.write_off() + size > self.options.data_file_size);
        if rotate {
            // Sync the outgoing file so rollover never leaves unflushed
            // records behind an immutable id, and open the successor before
            // retiring it so an open failure leaves the engine writable.
            if let Some(active) = files.active.as_ref() {
                active.sync()?;
            }
            let next_id = files.active.as_ref().map_or(0, |a| a.file_id() + 1);
            let next = DataFile::open(&self.options.dir_path, next_id, IoKind::Standard)?;
            if let Some(prev) = files.active.replace(next) {
                files.older.insert(prev.file_id(), prev);
            }
        }

        let (file_id, offset) = {
            let active = match files.active.as_mut() {
                Some(active) => active,
                None => unreachable!("active file exists after ensure"),
            };
            let offset = active.write_off();
            active.append(&encoded)?;
            (active.file_id(), offset)
        };

        files.bytes_since_sync += size;
        let need_sync = self.options.sync_writes
            || (self.options.bytes_per_sync > 0
                && files.bytes_since_sync >= self.options.bytes_per_sync);
        if need_sync {
            if let Some(active) = files.active.as_ref() {
                active.sync()?;
            }
            files.bytes_since_sync = 0;
        }

        Ok(RecordPos {
            file_id,
            offset,
            size: size as u32,
        })
    }
}
