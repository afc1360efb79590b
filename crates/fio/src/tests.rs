use super::*;
use tempfile::tempdir;

#[test]
fn standard_write_then_read_at() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.data");

    let mut io = StandardIo::open(&path).unwrap();
    assert_eq!(io.size().unwrap(), 0);

    io.write_at(b"hello ", 0).unwrap();
    io.write_at(b"world", 6).unwrap();
    assert_eq!(io.size().unwrap(), 11);

    let mut buf = [0u8; 5];
    let n = io.read_at(&mut buf, 6).unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buf, b"world");
}

#[test]
fn standard_write_at_overwrites_in_place() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.data");

    let mut io = StandardIo::open(&path).unwrap();
    io.write_at(b"stale-tail", 0).unwrap();
    io.write_at(b"fresh", 0).unwrap();

    let mut buf = [0u8; 10];
    assert_eq!(io.read_at(&mut buf, 0).unwrap(), 10);
    assert_eq!(&buf, b"fresh-tail");
}

#[test]
fn standard_read_past_eof_is_short() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.data");

    let mut io = StandardIo::open(&path).unwrap();
    io.write_at(b"abc", 0).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(io.read_at(&mut buf, 1).unwrap(), 2);
    assert_eq!(io.read_at(&mut buf, 3).unwrap(), 0);
    assert_eq!(io.read_at(&mut buf, 100).unwrap(), 0);
}

#[test]
fn standard_sync_succeeds() {
    let dir = tempdir().unwrap();
    let mut io = StandardIo::open(&dir.path().join("a.data")).unwrap();
    io.write_at(b"durable", 0).unwrap();
    io.sync().unwrap();
}

#[test]
fn mmap_reads_existing_content() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.data");

    let mut w = StandardIo::open(&path).unwrap();
    w.write_at(b"mapped-content", 0).unwrap();
    w.sync().unwrap();

    let m = MmapIo::open(&path).unwrap();
    assert_eq!(m.size().unwrap(), 14);

    let mut buf = [0u8; 7];
    assert_eq!(m.read_at(&mut buf, 0).unwrap(), 7);
    assert_eq!(&buf, b"mapped-");
    assert_eq!(m.read_at(&mut buf, 14).unwrap(), 0);
}

#[test]
fn mmap_of_empty_file_reads_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.data");
    StandardIo::open(&path).unwrap();

    let m = MmapIo::open(&path).unwrap();
    assert_eq!(m.size().unwrap(), 0);
    let mut buf = [0u8; 4];
    assert_eq!(m.read_at(&mut buf, 0).unwrap(), 0);
}

#[test]
fn mmap_rejects_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.data");
    StandardIo::open(&path).unwrap();

    let mut m = MmapIo::open(&path).unwrap();
    assert!(m.write_at(b"nope", 0).is_err());
    assert!(m.sync().is_err());
}
