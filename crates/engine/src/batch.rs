//! Atomic write batches.
//!
//! A batch buffers puts and deletes in memory, keyed by user key with
//! last-write-wins, in insertion order. `commit` assigns one fresh sequence
//! number, appends every buffered record with its key tagged by that
//! sequence, then appends a `TxnCommit` marker. Recovery only applies
//! sequence-tagged records once it sees their marker, so a crash anywhere
//! before the marker hits disk erases the whole batch.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use datalog::{encode_key_with_seq, LogRecord, RecordType};

use crate::{Engine, Error, Result, WriteBatchOptions};

/// Key of the commit-marker record terminating each batch, tagged with the
/// batch's sequence number like every other record in it.
pub(crate) const TXN_FINISH_KEY: &[u8] = b"txn.finished";

/// A buffered set of writes committed atomically.
///
/// Obtained from [`Engine::new_write_batch`]. Nothing reaches disk or the
/// index until [`commit`](WriteBatch::commit); an uncommitted batch simply
/// evaporates when dropped.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    pending: Mutex<PendingWrites>,
}

/// Insertion-ordered key-to-record buffer. Slots keep their position across
/// overwrites so iteration order is first-insertion order; a removed entry
/// leaves an empty slot behind.
#[derive(Default)]
struct PendingWrites {
    slots: Vec<Option<LogRecord>>,
    by_key: HashMap<Vec<u8>, usize>,
    live: usize,
}

impl PendingWrites {
    fn upsert(&mut self, record: LogRecord) {
        match self.by_key.get(&record.key) {
            Some(&at) => {
                if self.slots[at].is_none() {
                    self.live += 1;
                }
                self.slots[at] = Some(record);
            }
            None => {
                self.by_key.insert(record.key.clone(), self.slots.len());
                self.slots.push(Some(record));
                self.live += 1;
            }
        }
    }

    fn remove(&mut self, key: &[u8]) {
        if let Some(&at) = self.by_key.get(key) {
            if self.slots[at].take().is_some() {
                self.live -= 1;
            }
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.by_key.clear();
        self.live = 0;
    }
}

impl Engine {
    /// Starts an empty write batch against this engine.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> WriteBatch<'_> {
        WriteBatch {
            engine: self,
            options,
            pending: Mutex::new(PendingWrites::default()),
        }
    }
}

impl WriteBatch<'_> {
    /// Buffers a put. A later put or delete of the same key within the
    /// batch replaces it.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.pending.lock().upsert(LogRecord {
            key: key.to_vec(),
            value: value.to_vec(),
            rec_type: RecordType::Normal,
        });
        Ok(())
    }

    /// Buffers a delete. When the key exists neither on disk nor in the
    /// batch there is nothing to tombstone, so any pending entry is dropped
    /// and no record is buffered.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let mut pending = self.pending.lock();
        if self.engine.index.get(key).is_none() {
            pending.remove(key);
            return Ok(());
        }
        pending.upsert(LogRecord {
            key: key.to_vec(),
            value: Vec::new(),
            rec_type: RecordType::Tombstone,
        });
        Ok(())
    }

    /// Commits every buffered operation atomically.
    ///
    /// An empty batch is a no-op. Fails with [`Error::BatchTooLarge`] when
    /// the buffer exceeds `max_batch_num`.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.live == 0 {
            return Ok(());
        }
        if pending.live > self.options.max_batch_num {
            return Err(Error::BatchTooLarge);
        }

        // One engine write lock covers the appends, the marker, and the
        // index application, so observers see the batch all at once.
        let mut files = self.engine.files.write();
        let seq = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut positions = Vec::with_capacity(pending.live);
        for record in pending.slots.iter().flatten() {
            let tagged = LogRecord {
                key: encode_key_with_seq(&record.key, seq),
                value: record.value.clone(),
                rec_type: record.rec_type,
            };
            positions.push(self.engine.append_record(&mut files, &tagged)?);
        }

        let marker = LogRecord {
            key: encode_key_with_seq(TXN_FINISH_KEY, seq),
            value: Vec::new(),
            rec_type: RecordType::TxnCommit,
        };
        self.engine.append_record(&mut files, &marker)?;

        if self.options.sync_writes {
            if let Some(active) = files.active.as_ref() {
                active.sync()?;
            }
        }

        // The marker is durable; apply to the index before releasing the
        // engine lock.
        for (record, pos) in pending.slots.iter().flatten().zip(positions) {
            match record.rec_type {
                RecordType::Normal => {
                    if let Some(old) = self.engine.index.put(record.key.clone(), pos) {
                        self.engine
                            .reclaimable
                            .fetch_add(u64::from(old.size), Ordering::SeqCst);
                    }
                }
                RecordType::Tombstone => {
                    self.engine
                        .reclaimable
                        .fetch_add(u64::from(pos.size), Ordering::SeqCst);
                    if let Some(old) = self.engine.index.delete(&record.key).0 {
                        self.engine
                            .reclaimable
                            .fetch_add(u64::from(old.size), Ordering::SeqCst);
                    }
                }
                RecordType::TxnCommit => {}
            }
        }

        pending.clear();
        Ok(())
    }
}
