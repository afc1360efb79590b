use std::path::{Path, PathBuf};

use fio::{IoBackend, IoKind};

use crate::record::{
    compute_crc, decode_header, encode_record_pos, LogError, LogRecord, RecordPos, RecordType,
    MAX_HEADER_SIZE,
};

/// Suffix of every numbered data file.
pub const DATA_FILE_SUFFIX: &str = ".data";
/// Hint file emitted by merge: `(key, encoded position)` records.
pub const HINT_FILE_NAME: &str = "hint-index";
/// Marker whose presence commits a merge; its value is the first un-merged
/// file id in ASCII decimal.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
/// Holds the last assigned sequence number across clean restarts.
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// Full path of data file `file_id` inside `dir`: nine-digit zero-padded id
/// plus [`DATA_FILE_SUFFIX`].
pub fn data_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{:09}{}", file_id, DATA_FILE_SUFFIX))
}

/// A single append-only segment of the log.
///
/// At most one data file per engine is writable (the active file); the rest
/// are immutable and only ever read at a position. The same type also backs
/// the auxiliary single-record files (hint, seq-no, merge-finished), which
/// use file id 0 and standard I/O.
pub struct DataFile {
    file_id: u32,
    /// Offset of the next append. Maintained by the engine: recovery sets it
    /// to the scan end of the last file so a torn tail is overwritten cleanly.
    write_off: u64,
    path: PathBuf,
    io: Box<dyn IoBackend>,
}

impl DataFile {
    /// Opens data file `file_id` in `dir` with the requested I/O kind.
    pub fn open(dir: &Path, file_id: u32, kind: IoKind) -> Result<Self, LogError> {
        Self::open_path(data_file_path(dir, file_id), file_id, kind)
    }

    pub fn hint_file(dir: &Path) -> Result<Self, LogError> {
        Self::open_path(dir.join(HINT_FILE_NAME), 0, IoKind::Standard)
    }

    pub fn merge_finished_file(dir: &Path) -> Result<Self, LogError> {
        Self::open_path(dir.join(MERGE_FINISHED_FILE_NAME), 0, IoKind::Standard)
    }

    pub fn seq_no_file(dir: &Path) -> Result<Self, LogError> {
        Self::open_path(dir.join(SEQ_NO_FILE_NAME), 0, IoKind::Standard)
    }

    fn open_path(path: PathBuf, file_id: u32, kind: IoKind) -> Result<Self, LogError> {
        let io = fio::open(&path, kind)?;
        Ok(Self {
            file_id,
            write_off: 0,
            path,
            io,
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u64 {
        self.write_off
    }

    pub fn set_write_off(&mut self, off: u64) {
        self.write_off = off;
    }

    /// Appends raw encoded bytes at `write_off` and advances it.
    /// Single-writer only. The positional write means a recovered
    /// `write_off` short of the physical file end simply overwrites the
    /// torn tail behind it.
    pub fn append(&mut self, buf: &[u8]) -> Result<(), LogError> {
        let n = self.io.write_at(buf, self.write_off)?;
        self.write_off += n as u64;
        Ok(())
    }

    /// Appends one hint entry: `key` framed as a normal record whose value is
    /// the encoded `pos`.
    pub fn write_hint_record(&mut self, key: &[u8], pos: &RecordPos) -> Result<(), LogError> {
        let rec = LogRecord {
            key: key.to_vec(),
            value: encode_record_pos(pos),
            rec_type: RecordType::Normal,
        };
        self.append(&rec.encode())
    }

    /// Reads and verifies the record starting at `offset`, returning it with
    /// its total encoded size.
    ///
    /// Returns [`LogError::Eof`] at the end of the stream, which includes a
    /// zero-filled or truncated tail left by a crash mid-append.
    pub fn read_record(&self, offset: u64) -> Result<(LogRecord, u64), LogError> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Err(LogError::Eof);
        }

        // Clamp the header read at EOF so short tails decode as EOF rather
        // than a read error.
        let mut header_len = MAX_HEADER_SIZE as u64;
        let clamped = offset + header_len > file_size;
        if clamped {
            header_len = file_size - offset;
        }

        let mut header_buf = vec![0u8; header_len as usize];
        let n = self.io.read_at(&mut header_buf, offset)?;
        header_buf.truncate(n);

        let (header, header_size) = match decode_header(&header_buf) {
            Ok(decoded) => decoded,
            // A header cut off by the end of the file is a torn tail.
            Err(LogError::CorruptHeader) if clamped => return Err(LogError::Eof),
            Err(e) => return Err(e),
        };

        // Data files may end in zero padding after a crash.
        if header.crc == 0 && header.key_size == 0 && header.value_size == 0 {
            return Err(LogError::Eof);
        }

        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let total = header_size as u64 + key_size as u64 + value_size as u64;

        let mut payload = vec![0u8; key_size + value_size];
        if !payload.is_empty() {
            let n = self.io.read_at(&mut payload, offset + header_size as u64)?;
            if n < payload.len() {
                return Err(LogError::Eof);
            }
        }

        let crc = compute_crc(
            &header_buf[4..header_size],
            &payload[..key_size],
            &payload[key_size..],
        );
        if crc != header.crc {
            return Err(LogError::InvalidCrc);
        }

        let value = payload.split_off(key_size);
        Ok((
            LogRecord {
                key: payload,
                value,
                rec_type: header.rec_type,
            },
            total,
        ))
    }

    /// Forces everything appended so far to durable storage.
    pub fn sync(&self) -> Result<(), LogError> {
        Ok(self.io.sync()?)
    }

    pub fn size(&self) -> Result<u64, LogError> {
        Ok(self.io.size()?)
    }

    /// Swaps the underlying I/O back-end, keeping the same path and offsets.
    /// Used to drop back from mmap reads to standard I/O after recovery.
    pub fn set_io_kind(&mut self, kind: IoKind) -> Result<(), LogError> {
        self.io = fio::open(&self.path, kind)?;
        Ok(())
    }
}
