//! Cold-start recovery: discover data files, replay the hint file, then
//! replay the tail of the log to rebuild the index.
//!
//! Data files are replayed with a per-sequence staging map so that write
//! batches are atomic across crashes: records tagged with a sequence are
//! held back until that sequence's commit marker appears, and anything still
//! staged at end-of-log is dropped.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::Ordering;

use fio::IoKind;
use tracing::debug;

use datalog::{
    decode_record_pos, parse_key_with_seq, DataFile, LogError, RecordPos, RecordType,
    DATA_FILE_SUFFIX, HINT_FILE_NAME, SEQ_NO_FILE_NAME, NON_TXN_SEQ,
};

use crate::{merge, Engine, Error, Result};

impl Engine {
    /// Scans the directory for `.data` files and opens them, the largest id
    /// as the active file and the rest as immutable. Returns the sorted ids.
    pub(crate) fn load_data_files(&self) -> Result<Vec<u32>> {
        let mut file_ids: Vec<u32> = Vec::new();
        for entry in fs::read_dir(&self.options.dir_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
                let id = stem.parse().map_err(|_| Error::DataDirectoryCorrupted)?;
                file_ids.push(id);
            }
        }
        file_ids.sort_unstable();

        let kind = if self.options.mmap_at_startup {
            IoKind::Mmap
        } else {
            IoKind::Standard
        };

        let mut files = self.files.write();
        for (i, &id) in file_ids.iter().enumerate() {
            let data_file = DataFile::open(&self.options.dir_path, id, kind)?;
            if i == file_ids.len() - 1 {
                files.active = Some(data_file);
            } else {
                files.older.insert(id, data_file);
            }
        }

        Ok(file_ids)
    }

    /// Replays the hint file, installing every `(key, position)` pair
    /// unconditionally. The hint is the authoritative live snapshot for all
    /// files below the first un-merged id.
    pub(crate) fn load_index_from_hint_file(&self) -> Result<()> {
        if !self.options.dir_path.join(HINT_FILE_NAME).exists() {
            return Ok(());
        }

        let hint = DataFile::hint_file(&self.options.dir_path)?;
        let mut offset = 0u64;
        let mut installed = 0usize;
        loop {
            let (record, size) = match hint.read_record(offset) {
                Ok(decoded) => decoded,
                Err(LogError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let pos = decode_record_pos(&record.value).ok_or(Error::DataDirectoryCorrupted)?;
            self.index.put(record.key, pos);
            installed += 1;
            offset += size;
        }
        debug!(installed, "hint file replayed");
        Ok(())
    }

    /// Replays every data file at or above the first un-merged id, applying
    /// records to the index and restoring the sequence counter.
    pub(crate) fn load_index_from_data_files(&self, file_ids: &[u32]) -> Result<()> {
        if file_ids.is_empty() {
            return Ok(());
        }

        // Files below this id were covered by the hint file.
        let first_unmerged = merge::first_unmerged_id(&self.options.dir_path)?;

        // Batch records wait here for their commit marker.
        let mut staged: HashMap<u64, Vec<(Vec<u8>, RecordType, RecordPos)>> = HashMap::new();
        let mut max_seq = NON_TXN_SEQ;
        let mut reclaimed = 0u64;

        let mut files = self.files.write();
        for (i, &file_id) in file_ids.iter().enumerate() {
            if matches!(first_unmerged, Some(first) if file_id < first) {
                continue;
            }

            let is_last = i == file_ids.len() - 1;
            let data_file = if is_last {
                files.active.as_ref()
            } else {
                files.older.get(&file_id)
            };
            let data_file = data_file.ok_or(Error::DataFileNotFound)?;

            let mut offset = 0u64;
            loop {
                let (record, size) = match data_file.read_record(offset) {
                    Ok(decoded) => decoded,
                    Err(LogError::Eof) => break,
                    Err(e) => return Err(e.into()),
                };

                let pos = RecordPos {
                    file_id,
                    offset,
                    size: size as u32,
                };
                let (real_key, seq) = parse_key_with_seq(&record.key);

                if seq == NON_TXN_SEQ {
                    reclaimed += self.apply_to_index(real_key, record.rec_type, pos);
                } else if record.rec_type == RecordType::TxnCommit {
                    // The whole batch is on disk; it becomes visible now.
                    if let Some(entries) = staged.remove(&seq) {
                        for (key, rec_type, entry_pos) in entries {
                            reclaimed += self.apply_to_index(key, rec_type, entry_pos);
                        }
                    }
                } else {
                    staged
                        .entry(seq)
                        .or_default()
                        .push((real_key, record.rec_type, pos));
                }

                if seq > max_seq {
                    max_seq = seq;
                }
                offset += size;
            }

            // The next append overwrites whatever torn bytes follow the last
            // decodable record.
            if is_last {
                if let Some(active) = files.active.as_mut() {
                    active.set_write_off(offset);
                }
            }
        }

        // Anything still staged lost its commit marker to a crash.
        if !staged.is_empty() {
            debug!(batches = staged.len(), "dropping uncommitted batches");
        }

        self.seq_no.store(max_seq, Ordering::SeqCst);
        self.reclaimable.fetch_add(reclaimed, Ordering::SeqCst);
        Ok(())
    }

    /// Applies one recovered record to the index, returning how many bytes
    /// it made reclaimable.
    fn apply_to_index(&self, key: Vec<u8>, rec_type: RecordType, pos: RecordPos) -> u64 {
        let mut reclaimed = 0u64;
        let old = if rec_type == RecordType::Tombstone {
            reclaimed += u64::from(pos.size);
            self.index.delete(&key).0
        } else {
            self.index.put(key, pos)
        };
        if let Some(old) = old {
            reclaimed += u64::from(old.size);
        }
        reclaimed
    }

    /// Restores the sequence counter persisted by the last clean close, then
    /// deletes the file. Only engines with the on-disk index call this; the
    /// others recover the counter from the log itself.
    pub(crate) fn load_seq_no(&self) -> Result<()> {
        let path = self.options.dir_path.join(SEQ_NO_FILE_NAME);
        if !path.exists() {
            return Ok(());
        }

        let seq_file = DataFile::seq_no_file(&self.options.dir_path)?;
        let (record, _) = seq_file.read_record(0)?;
        let seq = std::str::from_utf8(&record.value)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(Error::DataDirectoryCorrupted)?;
        self.seq_no.store(seq, Ordering::SeqCst);

        fs::remove_file(&path)?;
        Ok(())
    }

    /// Reopens every data file with standard I/O after an mmap-backed
    /// recovery scan, so appends work again.
    pub(crate) fn reset_io_kind(&self) -> Result<()> {
        let mut files = self.files.write();
        if let Some(active) = files.active.as_mut() {
            active.set_io_kind(IoKind::Standard)?;
        }
        for data_file in files.older.values_mut() {
            data_file.set_io_kind(IoKind::Standard)?;
        }
        Ok(())
    }
}
