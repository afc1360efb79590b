//! # datalog — Append-only record log
//!
//! The on-disk substance of EmberKV. Every mutation becomes one immutable
//! record appended to a numbered data file; this crate owns the record wire
//! format and the data-file handle.
//!
//! ## Record wire format
//!
//! ```text
//! +--------+------+-----------+-----------+---------+-----------+
//! | crc u32| typ  | ksize_vi  | vsize_vi  | key ... | value ... |
//! +--------+------+-----------+-----------+---------+-----------+
//!  little-endian CRC32 (IEEE) over everything after the CRC field
//! ```
//!
//! `ksize_vi` / `vsize_vi` are zig-zag varints of at most 5 bytes each, so a
//! header never exceeds [`MAX_HEADER_SIZE`] (15) bytes. `typ` is one byte:
//! `0` normal, `1` tombstone, `2` transaction-commit marker.
//!
//! Keys on disk always carry a plain-varint sequence-number prefix
//! ([`encode_key_with_seq`]); sequence `0` marks a non-transactional write.
//!
//! Hint files reuse the same framing with the record position serialized
//! into the value field as three zig-zag varints (`fid`, `offset`, `size`).
//!
//! A truncated record at the end of a file (crash mid-append) decodes as a
//! clean [`LogError::Eof`]; every fully-written record before it is intact.

mod data_file;
mod record;

pub use data_file::{
    data_file_path, DataFile, DATA_FILE_SUFFIX, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME,
    SEQ_NO_FILE_NAME,
};
pub use record::{
    compute_crc, decode_header, decode_record_pos, encode_key_with_seq, encode_record_pos,
    parse_key_with_seq, LogError, LogRecord, RecordHeader, RecordPos, RecordType, MAX_HEADER_SIZE,
    NON_TXN_SEQ,
};

#[cfg(test)]
mod tests;
