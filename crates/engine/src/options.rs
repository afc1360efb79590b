use std::path::PathBuf;

use index::IndexKind;

/// Engine configuration, validated by [`Engine::open`](crate::Engine::open).
#[derive(Debug, Clone)]
pub struct Options {
    /// Database directory. Created if missing.
    pub dir_path: PathBuf,

    /// Rollover threshold in bytes for the active data file. Must be > 0.
    pub data_file_size: u64,

    /// Fsync after every append.
    pub sync_writes: bool,

    /// When > 0 and `sync_writes` is off, fsync once this many bytes have
    /// accumulated since the last sync.
    pub bytes_per_sync: u64,

    /// Index back-end. Defaults to the persistent B+ tree, which keeps the
    /// key directory across restarts without replaying the log.
    pub index_kind: IndexKind,

    /// Use memory-mapped reads for the recovery scan at open. All files
    /// revert to standard I/O before the engine starts serving.
    pub mmap_at_startup: bool,

    /// Minimum `reclaimable / total` ratio required for [`merge`]
    /// (crate::Engine::merge) to run, in `[0, 1]`.
    pub merge_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("ember-kv"),
            data_file_size: 256 * 1024 * 1024,
            sync_writes: false,
            bytes_per_sync: 0,
            index_kind: IndexKind::OnDiskBTree,
            mmap_at_startup: false,
            merge_ratio: 0.5,
        }
    }
}

/// Options for [`Engine::new_iterator`](crate::Engine::new_iterator).
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix. Empty means all keys.
    pub prefix: Vec<u8>,

    /// Iterate in descending key order.
    pub reverse: bool,
}

/// Options for [`Engine::new_write_batch`](crate::Engine::new_write_batch).
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Maximum number of buffered records a single commit may carry.
    pub max_batch_num: usize,

    /// Fsync the active file once the commit marker has been appended.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: 10_000,
            sync_writes: true,
        }
    }
}
