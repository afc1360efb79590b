//! # fio — File I/O back-ends
//!
//! A thin abstraction over the two ways EmberKV touches data files:
//!
//! * [`StandardIo`] — an ordinary file descriptor. Positional reads and
//!   writes plus fsync. This is the only back-end that can write, and the
//!   one every file uses once the engine is open.
//! * [`MmapIo`] — a read-only memory map. Used only during startup recovery
//!   scans (`mmap_at_startup`), where sequential decoding of whole files is
//!   markedly faster than issuing one pread per record. The engine swaps
//!   every file back to [`StandardIo`] before serving traffic.
//!
//! Both implement [`IoBackend`], so [`DataFile`](../datalog) never cares
//! which one it holds.
//!
//! All access is positional and takes `&self` where possible: many readers
//! can issue preads on the same descriptor concurrently without a shared
//! cursor. Writes are positional too (`pwrite`), so the engine's append
//! offset is the single source of truth for where the log ends — after a
//! crash, the first append lands exactly at the recovered scan end and
//! overwrites any torn tail.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::Mmap;

fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
}

/// Which I/O back-end a file should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// Standard file descriptor: positional read, positional write, sync.
    Standard,
    /// Read-only memory map; writes are rejected.
    Mmap,
}

/// Uniform read-at / write-at / sync / size surface over a single file.
pub trait IoBackend: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes read. Reads past the end of the file return fewer
    /// bytes (possibly zero), never an error.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Writes all of `buf` at `offset`, extending the file as needed.
    /// Single-writer only.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Forces all written bytes to durable storage (fsync).
    fn sync(&self) -> io::Result<()>;

    /// Current size of the file in bytes.
    fn size(&self) -> io::Result<u64>;
}

/// Opens the back-end of the requested kind for `path`.
pub fn open(path: &Path, kind: IoKind) -> io::Result<Box<dyn IoBackend>> {
    match kind {
        IoKind::Standard => Ok(Box::new(StandardIo::open(path)?)),
        IoKind::Mmap => Ok(Box::new(MmapIo::open(path)?)),
    }
}

/// File-descriptor back-end.
pub struct StandardIo {
    file: File,
}

impl StandardIo {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: open_rw(path)?,
        })
    }
}

impl IoBackend for StandardIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            // Loop: read_at may return short counts before EOF.
            let mut read = 0;
            while read < buf.len() {
                match self.file.read_at(&mut buf[read..], offset + read as u64) {
                    Ok(0) => break,
                    Ok(n) => read += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(read)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            let mut read = 0;
            while read < buf.len() {
                match self.file.seek_read(&mut buf[read..], offset + read as u64) {
                    Ok(0) => break,
                    Ok(n) => read += n,
                    Err(e) => return Err(e),
                }
            }
            Ok(read)
        }
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.write_all_at(buf, offset)?;
            Ok(buf.len())
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            let mut written = 0;
            while written < buf.len() {
                match self.file.seek_write(&buf[written..], offset + written as u64) {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "failed to write whole buffer",
                        ))
                    }
                    Ok(n) => written += n,
                    Err(e) => return Err(e),
                }
            }
            Ok(written)
        }
    }

    fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// Read-only memory-mapped back-end.
///
/// Mapping a zero-length file is rejected by the OS, so an empty file maps
/// to `None` and every read returns zero bytes.
pub struct MmapIo {
    map: Option<Mmap>,
}

impl MmapIo {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = open_rw(path)?;
        let len = file.metadata()?.len();
        let map = if len == 0 {
            None
        } else {
            // Safety: the engine is the single writer and only ever appends;
            // mapped regions are never truncated or rewritten underneath us.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { map })
    }
}

impl IoBackend for MmapIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data: &[u8] = match &self.map {
            Some(m) => m,
            None => return Ok(0),
        };
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&mut self, _buf: &[u8], _offset: u64) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "memory-mapped files are read-only",
        ))
    }

    fn sync(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "memory-mapped files are read-only",
        ))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.map.as_ref().map_or(0, |m| m.len() as u64))
    }
}

#[cfg(test)]
mod tests;
