use std::io;

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use thiserror::Error;

/// Largest possible record header: CRC + type byte + two 5-byte varints.
pub const MAX_HEADER_SIZE: usize = 4 + 1 + 5 + 5;

/// Sequence tag of a non-transactional write.
pub const NON_TXN_SEQ: u64 = 0;

/// Errors surfaced while encoding, decoding, or reading log records.
#[derive(Debug, Error)]
pub enum LogError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Clean end of the record stream (including a truncated tail record).
    #[error("reached end of data file")]
    Eof,

    /// The header could not be decoded.
    #[error("corrupt record header")]
    CorruptHeader,

    /// The record body did not match its stored CRC32.
    #[error("crc mismatch, record corrupted")]
    InvalidCrc,
}

/// What a record means to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A live key-value pair.
    Normal = 0,
    /// A deletion marker; carries no value.
    Tombstone = 1,
    /// Terminates a write batch; everything tagged with the same sequence
    /// number before this marker is committed.
    TxnCommit = 2,
}

impl RecordType {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(RecordType::Normal),
            1 => Some(RecordType::Tombstone),
            2 => Some(RecordType::TxnCommit),
            _ => None,
        }
    }
}

/// One log record, as written to and read from a data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: RecordType,
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub crc: u32,
    pub rec_type: RecordType,
    pub key_size: u32,
    pub value_size: u32,
}

/// Location of a record on disk: which file, where in it, how many bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPos {
    pub file_id: u32,
    pub offset: u64,
    pub size: u32,
}

impl LogRecord {
    /// Serializes the record into a single buffer: header, key, value, with
    /// the CRC filled in last.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_HEADER_SIZE + self.key.len() + self.value.len());

        // Reserve the CRC field, filled in below.
        buf.extend_from_slice(&[0u8; 4]);
        buf.push(self.rec_type as u8);
        write_varint_i64(&mut buf, self.key.len() as i64);
        write_varint_i64(&mut buf, self.value.len() as i64);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let mut hasher = Crc32::new();
        hasher.update(&buf[4..]);
        let crc = hasher.finalize();
        LittleEndian::write_u32(&mut buf[..4], crc);

        buf
    }
}

/// Decodes a record header from the front of `buf`, returning the header and
/// its encoded length.
///
/// Fails with [`LogError::CorruptHeader`] when fewer than 5 bytes are
/// available, the type byte is unknown, or a size varint is malformed.
pub fn decode_header(buf: &[u8]) -> Result<(RecordHeader, usize), LogError> {
    if buf.len() <= 4 {
        return Err(LogError::CorruptHeader);
    }

    let crc = LittleEndian::read_u32(&buf[..4]);
    let rec_type = RecordType::from_u8(buf[4]).ok_or(LogError::CorruptHeader)?;

    let mut at = 5;
    let (key_size, n) = read_varint_i64(&buf[at..]).ok_or(LogError::CorruptHeader)?;
    at += n;
    let (value_size, n) = read_varint_i64(&buf[at..]).ok_or(LogError::CorruptHeader)?;
    at += n;

    if key_size < 0 || value_size < 0 || key_size > u32::MAX as i64 || value_size > u32::MAX as i64
    {
        return Err(LogError::CorruptHeader);
    }

    Ok((
        RecordHeader {
            crc,
            rec_type,
            key_size: key_size as u32,
            value_size: value_size as u32,
        },
        at,
    ))
}

/// CRC32 over everything after the CRC field: the header tail (type byte and
/// size varints) followed by key and value.
pub fn compute_crc(header_after_crc: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(header_after_crc);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Serializes a [`RecordPos`] as three zig-zag varints, for hint-file values.
pub fn encode_record_pos(pos: &RecordPos) -> Vec<u8> {
    let mut buf = Vec::with_capacity(15);
    write_varint_i64(&mut buf, pos.file_id as i64);
    write_varint_i64(&mut buf, pos.offset as i64);
    write_varint_i64(&mut buf, pos.size as i64);
    buf
}

/// Inverse of [`encode_record_pos`]. `None` on malformed input.
pub fn decode_record_pos(buf: &[u8]) -> Option<RecordPos> {
    let (file_id, n) = read_varint_i64(buf)?;
    let mut at = n;
    let (offset, n) = read_varint_i64(&buf[at..])?;
    at += n;
    let (size, _) = read_varint_i64(&buf[at..])?;

    Some(RecordPos {
        file_id: file_id as u32,
        offset: offset as u64,
        size: size as u32,
    })
}

/// Prepends the plain-varint sequence number to `key`, producing the form
/// every key takes on disk.
pub fn encode_key_with_seq(key: &[u8], seq: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10 + key.len());
    write_varint_u64(&mut buf, seq);
    buf.extend_from_slice(key);
    buf
}

/// Splits a tagged on-disk key back into `(user_key, seq)`.
pub fn parse_key_with_seq(tagged: &[u8]) -> (Vec<u8>, u64) {
    match read_varint_u64(tagged) {
        Some((seq, n)) => (tagged[n..].to_vec(), seq),
        // Tagged keys are always written by us; a bare key means seq 0.
        None => (tagged.to_vec(), NON_TXN_SEQ),
    }
}

fn write_varint_u64(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

fn read_varint_u64(buf: &[u8]) -> Option<(u64, usize)> {
    let mut v = 0u64;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        v |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Some((v, i + 1));
        }
        shift += 7;
    }
    None
}

fn write_varint_i64(buf: &mut Vec<u8>, v: i64) {
    write_varint_u64(buf, ((v << 1) ^ (v >> 63)) as u64);
}

fn read_varint_i64(buf: &[u8]) -> Option<(i64, usize)> {
    let (u, n) = read_varint_u64(buf)?;
    Some((((u >> 1) as i64) ^ -((u & 1) as i64), n))
}
