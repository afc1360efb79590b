use std::fs;
use std::io;
use std::path::Path;

/// Total size in bytes of every file under `path`, recursively.
pub(crate) fn dir_size(path: &Path) -> io::Result<u64> {
    let mut size = 0u64;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += meta.len();
        }
    }
    Ok(size)
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
pub(crate) fn available_disk_size(path: &Path) -> io::Result<u64> {
    fs2::available_space(path)
}
