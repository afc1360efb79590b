//! Merge: rewrite live records into a staging directory, emit a hint file,
//! and commit by writing the `merge-finished` marker.
//!
//! The staging directory is `<parent>/<base>-merge`. Everything in it is
//! ephemeral until the marker exists; the next open either adopts the whole
//! directory (marker present) or discards it (crash mid-merge). Adoption
//! deletes every data file below the first un-merged id from the database
//! directory and renames the staged files into place — a sequence that can
//! be safely retried at any point.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use fio::IoKind;
use tracing::{info, warn};

use datalog::{
    data_file_path, encode_key_with_seq, parse_key_with_seq, DataFile, LogError, LogRecord,
    RecordType, MERGE_FINISHED_FILE_NAME, NON_TXN_SEQ, SEQ_NO_FILE_NAME,
};
use index::BPTREE_INDEX_FILE_NAME;

use crate::{util, Engine, Error, IndexKind, Options, Result, FILE_LOCK_NAME};

const MERGE_DIR_SUFFIX: &str = "-merge";

/// Key of the single record inside the merge-finished marker file.
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Staging directory for `dir`: a sibling named `<base>-merge`.
pub(crate) fn merge_path(dir: &Path) -> PathBuf {
    let parent = dir.parent().unwrap_or_else(|| Path::new(""));
    let mut name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(MERGE_DIR_SUFFIX);
    parent.join(name)
}

/// Reads the first un-merged file id from `dir`'s marker file, or `None`
/// when no merge has completed there.
pub(crate) fn first_unmerged_id(dir: &Path) -> Result<Option<u32>> {
    if !dir.join(MERGE_FINISHED_FILE_NAME).exists() {
        return Ok(None);
    }

    let marker = DataFile::merge_finished_file(dir)?;
    let (record, _) = marker.read_record(0)?;
    let id = std::str::from_utf8(&record.value)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(Error::DataDirectoryCorrupted)?;
    Ok(Some(id))
}

/// Swaps a completed merge into the database directory, or discards an
/// unfinished one. Runs at open, before any file is opened. Returns whether
/// a merge was adopted.
pub(crate) fn adopt_merge_dir(options: &Options) -> Result<bool> {
    let staging = merge_path(&options.dir_path);
    if !staging.is_dir() {
        return Ok(false);
    }

    if !staging.join(MERGE_FINISHED_FILE_NAME).exists() {
        warn!(dir = %staging.display(), "discarding unfinished merge directory");
        fs::remove_dir_all(&staging)?;
        return Ok(false);
    }

    let first_unmerged =
        first_unmerged_id(&staging)?.ok_or(Error::DataDirectoryCorrupted)?;

    // Every merged-away file is superseded by the staged rewrite.
    for file_id in 0..first_unmerged {
        let path = data_file_path(&options.dir_path, file_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
    }

    // Move the staged data files, hint file, and marker into place. The
    // staging engine's own lock, sequence, and index files die with the dir.
    for entry in fs::read_dir(&staging)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if name == FILE_LOCK_NAME
                || name == SEQ_NO_FILE_NAME
                || name == BPTREE_INDEX_FILE_NAME
            {
                continue;
            }
        }
        fs::rename(entry.path(), options.dir_path.join(&name))?;
    }
    fs::remove_dir_all(&staging)?;

    info!(first_unmerged, "merge directory adopted");
    Ok(true)
}

impl Engine {
    /// Reclaims the space held by obsolete and tombstoned records.
    ///
    /// Rotates the active file, rewrites every still-live record from the
    /// frozen files into a staging engine, emits a hint file, and commits
    /// with a `merge-finished` marker. The staging directory is adopted at
    /// the next open. Reads and writes proceed concurrently; the engine
    /// lock is held only for the rotate-and-snapshot step.
    ///
    /// # Errors
    ///
    /// * [`Error::MergeInProgress`] when another merge is running.
    /// * [`Error::MergeRatioUnreached`] when `reclaimable / total` is below
    ///   `options.merge_ratio`.
    /// * [`Error::InsufficientDiskSpace`] when the surviving data would not
    ///   fit on the disk.
    pub fn merge(&self) -> Result<()> {
        let merging = self.merge_lock.try_lock().ok_or(Error::MergeInProgress)?;

        {
            let files = self.files.read();
            if files.active.is_none() {
                return Ok(());
            }
        }

        let total_size = util::dir_size(&self.options.dir_path)?;
        let reclaimable = self.reclaimable.load(Ordering::SeqCst);
        if (reclaimable as f32) / (total_size as f32) < self.options.merge_ratio {
            return Err(Error::MergeRatioUnreached);
        }
        let surviving = total_size.saturating_sub(reclaimable);
        if surviving >= util::available_disk_size(&self.options.dir_path)? {
            return Err(Error::InsufficientDiskSpace);
        }

        // Rotate under the engine lock so every file in the snapshot is
        // immutable; writes that race with the merge land in the new active
        // file, which is outside the snapshot and survives adoption.
        let (first_unmerged, merge_ids) = {
            let mut files = self.files.write();
            if let Some(active) = files.active.as_ref() {
                active.sync()?;
            }
            let next_id = files.active.as_ref().map_or(0, |a| a.file_id() + 1);
            let next = DataFile::open(&self.options.dir_path, next_id, IoKind::Standard)?;
            if let Some(prev) = files.active.replace(next) {
                files.older.insert(prev.file_id(), prev);
            }

            let mut ids: Vec<u32> = files.older.keys().copied().collect();
            ids.sort_unstable();
            (next_id, ids)
        };

        info!(files = merge_ids.len(), first_unmerged, "merge started");

        let staging = merge_path(&self.options.dir_path);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        // The staging engine only ever appends through its write path; its
        // durability comes from the final fsyncs and the marker, and its
        // index is never consulted, so an in-memory one avoids leaving an
        // index file in the staging directory.
        let mut merge_options = self.options.clone();
        merge_options.dir_path = staging.clone();
        merge_options.sync_writes = false;
        merge_options.mmap_at_startup = false;
        merge_options.index_kind = IndexKind::OrderedTree;
        let merge_engine = Engine::open(merge_options)?;

        let mut hint = DataFile::hint_file(&staging)?;

        for file_id in merge_ids {
            // A fresh read handle keeps the engine lock out of the scan.
            let data_file = DataFile::open(&self.options.dir_path, file_id, IoKind::Standard)?;
            let mut offset = 0u64;
            loop {
                let (record, size) = match data_file.read_record(offset) {
                    Ok(decoded) => decoded,
                    Err(LogError::Eof) => break,
                    Err(e) => return Err(e.into()),
                };

                let (real_key, _) = parse_key_with_seq(&record.key);
                let live = self.index.get(&real_key);
                if matches!(live, Some(live) if live.file_id == file_id && live.offset == offset) {
                    // Live records are committed by construction, so the
                    // rewrite drops the transaction tag.
                    let rewritten = LogRecord {
                        key: encode_key_with_seq(&real_key, NON_TXN_SEQ),
                        value: record.value,
                        rec_type: record.rec_type,
                    };
                    let pos = merge_engine.append_record_with_lock(&rewritten)?;
                    hint.write_hint_record(&real_key, &pos)?;
                }
                offset += size;
            }
        }

        hint.sync()?;
        merge_engine.sync()?;
        merge_engine.close()?;

        // The commit point: once this marker is durable, the next open
        // adopts the staging directory.
        let mut marker = DataFile::merge_finished_file(&staging)?;
        let record = LogRecord {
            key: MERGE_FINISHED_KEY.to_vec(),
            value: first_unmerged.to_string().into_bytes(),
            rec_type: RecordType::Normal,
        };
        marker.append(&record.encode())?;
        marker.sync()?;

        info!(first_unmerged, "merge finished");
        drop(merging);
        Ok(())
    }
}
