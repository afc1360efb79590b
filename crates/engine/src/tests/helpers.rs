use std::fs;
use std::path::Path;

use crate::{Engine, IndexKind, Options};

/// Options rooted at `dir`. Pins the in-memory index so these tests drive
/// the hint/log replay path at open; the on-disk back-end (which skips
/// replay) has its own dedicated tests.
pub fn opts(dir: &Path) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        index_kind: IndexKind::OrderedTree,
        ..Default::default()
    }
}

pub fn open_engine(dir: &Path) -> Engine {
    Engine::open(opts(dir)).unwrap()
}

pub fn count_data_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.ends_with(".data"))
                .unwrap_or(false)
        })
        .count()
}
