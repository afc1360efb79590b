//! # Engine - EmberKV storage engine
//!
//! A Bitcask-style persistent key-value store: every write appends one
//! immutable record to a growing sequence of data files, and an in-memory
//! index maps each live key to the position of its newest record.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌────────────────────────────────────────────────┐
//! │                   ENGINE                       │
//! │                                                │
//! │ write.rs → encode record → append to active    │
//! │              |       (size threshold reached?) │
//! │              |                yes              │
//! │              v                                 │
//! │         rollover: freeze file, open next id    │
//! │              |                                 │
//! │              v                                 │
//! │         index.put(key → {fid, offset, size})   │
//! │                                                │
//! │ read.rs → index lookup → pread owning file     │
//! │                                                │
//! │ merge.rs → rewrite live records into a shadow  │
//! │            dir + hint file, swap in at open    │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module        | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | `lib.rs`      | `Engine` struct, open/close, sync, stat, `Drop`      |
//! | [`recovery`]  | Data-file discovery, hint replay, tail replay        |
//! | [`write`]     | `put()`, `delete()`, the single-writer append path   |
//! | [`read`]      | `get()`, `list_keys()`, `fold()`                     |
//! | [`iterator`]  | Ordered, prefix-filtered iteration                   |
//! | [`batch`]     | Atomic write batches with commit markers             |
//! | [`merge`]     | Space reclamation + staging-directory adoption       |
//!
//! ## Crash safety
//!
//! Records carry a CRC32 and are only ever appended; a torn tail decodes as
//! end-of-file and is overwritten by the next append. A write batch becomes
//! visible exactly when its commit-marker record is on disk: recovery stages
//! sequence-tagged records and drops any batch whose marker never arrived.
//! A merge becomes visible exactly when its `merge-finished` marker is on
//! disk: adoption at the next open is a deterministic delete/rename sequence,
//! and a staging directory without the marker is discarded.

mod batch;
mod errors;
mod iterator;
mod merge;
mod options;
mod read;
mod recovery;
mod util;
mod write;

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use datalog::{DataFile, LogRecord, RecordType, SEQ_NO_FILE_NAME};
use index::Indexer;

pub use batch::WriteBatch;
pub use errors::{Error, Result};
pub use index::IndexKind;
pub use iterator::Iter;
pub use options::{IteratorOptions, Options, WriteBatchOptions};

/// Zero-byte file held under an advisory lock while the engine is open.
pub(crate) const FILE_LOCK_NAME: &str = "flock";

/// Key of the single record inside the sequence-number file.
pub(crate) const SEQ_NO_KEY: &[u8] = b"seq.no";

/// The storage engine. One per database directory; many-reader,
/// single-writer within the process, and exclusive across processes via the
/// directory lock.
pub struct Engine {
    pub(crate) options: Options,

    /// Active + immutable data files and the unsynced-byte accumulator, all
    /// behind the engine-wide readers-writer lock.
    pub(crate) files: RwLock<Files>,

    /// Key directory. Back-ends synchronize internally, so lookups never
    /// need the engine write lock.
    pub(crate) index: Box<dyn Indexer>,

    /// Latest assigned transaction sequence number; 0 means none yet.
    pub(crate) seq_no: AtomicU64,

    /// Bytes occupied by records that a merge could discard.
    pub(crate) reclaimable: AtomicU64,

    /// Held for the duration of a merge; `try_lock` failure means one is
    /// already running.
    pub(crate) merge_lock: Mutex<()>,

    lock_file: File,
    closed: AtomicBool,
}

/// File state guarded by the engine lock.
pub(crate) struct Files {
    /// The single writable data file, if any record was ever written.
    pub(crate) active: Option<DataFile>,
    /// Immutable data files by id.
    pub(crate) older: HashMap<u32, DataFile>,
    /// Bytes appended since the last fsync, for `bytes_per_sync`.
    pub(crate) bytes_since_sync: u64,
}

/// Point-in-time statistics, see [`Engine::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Live keys in the index.
    pub key_count: usize,
    /// Data files on disk, including the active one.
    pub data_file_count: usize,
    /// Bytes a merge could reclaim.
    pub reclaimable_bytes: u64,
    /// Total size of the database directory.
    pub directory_size: u64,
}

impl Engine {
    /// Opens (or creates) the database at `options.dir_path` and recovers
    /// the in-memory index.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidOptions`] on a bad configuration.
    /// * [`Error::DatabaseInUse`] when another process holds the directory.
    /// * [`Error::DataDirectoryCorrupted`] on malformed file names or
    ///   undecodable control records.
    /// * Any I/O or record error encountered during recovery.
    pub fn open(options: Options) -> Result<Engine> {
        check_options(&options)?;

        let dir = options.dir_path.clone();
        let mut initial = false;
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            initial = true;
        } else if fs::read_dir(&dir)?.next().is_none() {
            initial = true;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.join(FILE_LOCK_NAME))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| Error::DatabaseInUse)?;

        // A completed merge is swapped in before any file is opened.
        let adopted = merge::adopt_merge_dir(&options)?;

        let on_disk_index = options.index_kind == IndexKind::OnDiskBTree;
        let index = index::new_indexer(options.index_kind, &dir);

        let engine = Engine {
            options,
            files: RwLock::new(Files {
                active: None,
                older: HashMap::new(),
                bytes_since_sync: 0,
            }),
            index,
            seq_no: AtomicU64::new(0),
            reclaimable: AtomicU64::new(0),
            merge_lock: Mutex::new(()),
            lock_file,
            closed: AtomicBool::new(false),
        };

        let file_ids = engine.load_data_files()?;
        debug!(files = file_ids.len(), initial, "data files discovered");

        if on_disk_index {
            // The persistent index survives on its own; only the sequence
            // counter and the active write offset need restoring. Positions
            // rewritten by an adopted merge are repaired from the hint file.
            engine.load_seq_no()?;
            {
                let mut files = engine.files.write();
                if let Some(active) = files.active.as_mut() {
                    let size = active.size()?;
                    active.set_write_off(size);
                }
            }
            if adopted {
                engine.load_index_from_hint_file()?;
            }
        } else {
            engine.load_index_from_hint_file()?;
            engine.load_index_from_data_files(&file_ids)?;
        }

        if engine.options.mmap_at_startup {
            engine.reset_io_kind()?;
        }

        info!(
            dir = %engine.options.dir_path.display(),
            keys = engine.index.size(),
            "database opened"
        );
        Ok(engine)
    }

    /// Fsyncs the active data file.
    pub fn sync(&self) -> Result<()> {
        let files = self.files.read();
        if let Some(active) = files.active.as_ref() {
            active.sync()?;
        }
        Ok(())
    }

    /// Returns current engine statistics.
    pub fn stat(&self) -> Result<Stat> {
        let files = self.files.read();
        let data_file_count = files.older.len() + usize::from(files.active.is_some());
        drop(files);

        Ok(Stat {
            key_count: self.index.size(),
            data_file_count,
            reclaimable_bytes: self.reclaimable.load(Ordering::SeqCst),
            directory_size: util::dir_size(&self.options.dir_path)?,
        })
    }

    /// Flushes the active file, persists the sequence number, closes every
    /// file, and releases the directory lock. Idempotent; also invoked by
    /// `Drop`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.index.close();

        let mut files = self.files.write();
        if files.active.is_some() {
            // Rewrite the sequence-number file from scratch; the on-disk
            // index back-end reads (and deletes) it at the next open.
            let seq_path = self.options.dir_path.join(SEQ_NO_FILE_NAME);
            if seq_path.exists() {
                fs::remove_file(&seq_path)?;
            }
            let mut seq_file = DataFile::seq_no_file(&self.options.dir_path)?;
            let record = LogRecord {
                key: SEQ_NO_KEY.to_vec(),
                value: self.seq_no.load(Ordering::SeqCst).to_string().into_bytes(),
                rec_type: RecordType::Normal,
            };
            seq_file.append(&record.encode())?;
            seq_file.sync()?;

            if let Some(active) = files.active.as_ref() {
                active.sync()?;
            }
            files.active = None;
            files.older.clear();
        }
        drop(files);

        self.lock_file.unlock()?;
        Ok(())
    }
}

/// Best-effort close so the sequence number is persisted and the directory
/// lock released even when the caller forgets. The log itself is already
/// durable, so a failure here loses nothing that recovery cannot rebuild.
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let files = self.files.read();
        f.debug_struct("Engine")
            .field("dir_path", &self.options.dir_path)
            .field("index_kind", &self.options.index_kind)
            .field("seq_no", &self.seq_no.load(Ordering::SeqCst))
            .field("key_count", &self.index.size())
            .field(
                "active_file_id",
                &files.active.as_ref().map(|a| a.file_id()),
            )
            .field("older_file_count", &files.older.len())
            .finish()
    }
}

fn check_options(options: &Options) -> Result<()> {
    if options.dir_path.as_os_str().is_empty() {
        return Err(Error::InvalidOptions("dir_path must not be empty"));
    }
    if options.data_file_size == 0 {
        return Err(Error::InvalidOptions(
            "data_file_size must be greater than 0",
        ));
    }
    if !(0.0..=1.0).contains(&options.merge_ratio) {
        return Err(Error::InvalidOptions("merge_ratio must be between 0 and 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
