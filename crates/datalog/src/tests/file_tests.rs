use crate::*;
use fio::IoKind;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use tempfile::tempdir;

fn rec(key: &[u8], value: &[u8], rec_type: RecordType) -> LogRecord {
    LogRecord {
        key: key.to_vec(),
        value: value.to_vec(),
        rec_type,
    }
}

#[test]
fn data_file_name_is_zero_padded() {
    let dir = tempdir().unwrap();
    assert!(data_file_path(dir.path(), 0).ends_with("000000000.data"));
    assert!(data_file_path(dir.path(), 42).ends_with("000000042.data"));
}

#[test]
fn append_then_read_back_in_order() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open(dir.path(), 0, IoKind::Standard).unwrap();

    let records = vec![
        rec(b"a", b"1", RecordType::Normal),
        rec(b"b", b"", RecordType::Normal),
        rec(b"a", b"", RecordType::Tombstone),
    ];
    for r in &records {
        df.append(&r.encode()).unwrap();
    }
    df.sync().unwrap();

    let mut offset = 0u64;
    for want in &records {
        let (got, size) = df.read_record(offset).unwrap();
        assert_eq!(&got, want);
        offset += size;
    }
    assert!(matches!(df.read_record(offset), Err(LogError::Eof)));
    assert_eq!(df.write_off(), offset);
}

#[test]
fn read_past_end_is_eof() {
    let dir = tempdir().unwrap();
    let df = DataFile::open(dir.path(), 0, IoKind::Standard).unwrap();
    assert!(matches!(df.read_record(0), Err(LogError::Eof)));
    assert!(matches!(df.read_record(1024), Err(LogError::Eof)));
}

#[test]
fn truncated_tail_reads_as_eof() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open(dir.path(), 0, IoKind::Standard).unwrap();

    let full = rec(b"whole", b"record", RecordType::Normal).encode();
    df.append(&full).unwrap();

    // Simulate a crash mid-append: only part of the next record lands.
    let partial = rec(b"torn", b"never-finished", RecordType::Normal).encode();
    df.append(&partial[..6]).unwrap();

    let (got, size) = df.read_record(0).unwrap();
    assert_eq!(got.key, b"whole");
    assert!(matches!(df.read_record(size), Err(LogError::Eof)));
}

#[test]
fn zero_padded_tail_reads_as_eof() {
    let dir = tempdir().unwrap();
    let mut df = DataFile::open(dir.path(), 0, IoKind::Standard).unwrap();

    let full = rec(b"k", b"v", RecordType::Normal).encode();
    df.append(&full).unwrap();
    df.append(&[0u8; 32]).unwrap();

    let (_, size) = df.read_record(0).unwrap();
    assert!(matches!(df.read_record(size), Err(LogError::Eof)));
}

#[test]
fn corrupted_record_fails_crc() {
    let dir = tempdir().unwrap();
    let path = data_file_path(dir.path(), 0);

    {
        let mut df = DataFile::open(dir.path(), 0, IoKind::Standard).unwrap();
        df.append(&rec(b"name", b"Yra", RecordType::Normal).encode())
            .unwrap();
        df.sync().unwrap();
    }

    // Flip one payload byte on disk.
    let mut f = OpenOptions::new().write(true).open(&path).unwrap();
    f.seek(SeekFrom::Start(8)).unwrap();
    f.write_all(&[b'X']).unwrap();
    f.sync_all().unwrap();

    let df = DataFile::open(dir.path(), 0, IoKind::Standard).unwrap();
    assert!(matches!(df.read_record(0), Err(LogError::InvalidCrc)));
}

#[test]
fn hint_record_roundtrip() {
    let dir = tempdir().unwrap();
    let mut hint = DataFile::hint_file(dir.path()).unwrap();

    let pos = RecordPos {
        file_id: 7,
        offset: 4096,
        size: 120,
    };
    hint.write_hint_record(b"user:42", &pos).unwrap();
    hint.sync().unwrap();

    let (got, _) = hint.read_record(0).unwrap();
    assert_eq!(got.key, b"user:42");
    assert_eq!(got.rec_type, RecordType::Normal);
    assert_eq!(decode_record_pos(&got.value), Some(pos));
}

#[test]
fn mmap_and_standard_read_the_same_records() {
    let dir = tempdir().unwrap();

    {
        let mut df = DataFile::open(dir.path(), 0, IoKind::Standard).unwrap();
        for i in 0..50u32 {
            let r = rec(
                format!("key-{:03}", i).as_bytes(),
                format!("value-{}", i).as_bytes(),
                RecordType::Normal,
            );
            df.append(&r.encode()).unwrap();
        }
        df.sync().unwrap();
    }

    let mut df = DataFile::open(dir.path(), 0, IoKind::Mmap).unwrap();
    let mut offset = 0u64;
    let mut count = 0;
    loop {
        match df.read_record(offset) {
            Ok((_, size)) => {
                offset += size;
                count += 1;
            }
            Err(LogError::Eof) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(count, 50);

    // After swapping back to standard I/O the file accepts appends again.
    df.set_io_kind(IoKind::Standard).unwrap();
    df.set_write_off(offset);
    df.append(&rec(b"late", b"write", RecordType::Normal).encode())
        .unwrap();
    let (got, _) = df.read_record(offset).unwrap();
    assert_eq!(got.key, b"late");
}
