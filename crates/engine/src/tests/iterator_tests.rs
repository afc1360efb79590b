use super::helpers::{open_engine, opts};
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

fn seed(engine: &Engine) -> Result<()> {
    engine.put(b"user:alice", b"1")?;
    engine.put(b"user:bob", b"2")?;
    engine.put(b"order:7", b"pending")?;
    engine.put(b"order:3", b"shipped")?;
    engine.put(b"user:carol", b"3")?;
    Ok(())
}

fn collect_keys(iter: &mut Iter<'_>) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(iter.key().to_vec());
        iter.next();
    }
    keys
}

#[test]
fn ascending_order() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    seed(&engine)?;

    let mut iter = engine.new_iterator(IteratorOptions::default());
    let keys = collect_keys(&mut iter);
    iter.close();

    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys.len(), 5);
    Ok(())
}

#[test]
fn descending_order() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    seed(&engine)?;

    let mut iter = engine.new_iterator(IteratorOptions {
        reverse: true,
        ..Default::default()
    });
    let keys = collect_keys(&mut iter);
    iter.close();

    let mut sorted = keys.clone();
    sorted.sort();
    sorted.reverse();
    assert_eq!(keys, sorted);
    Ok(())
}

#[test]
fn prefix_filter() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    seed(&engine)?;

    let mut iter = engine.new_iterator(IteratorOptions {
        prefix: b"user:".to_vec(),
        reverse: false,
    });
    let keys = collect_keys(&mut iter);
    iter.close();

    assert_eq!(
        keys,
        vec![
            b"user:alice".to_vec(),
            b"user:bob".to_vec(),
            b"user:carol".to_vec()
        ]
    );
    Ok(())
}

#[test]
fn values_materialize_from_data_files() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    seed(&engine)?;

    let mut iter = engine.new_iterator(IteratorOptions {
        prefix: b"order:".to_vec(),
        reverse: false,
    });
    assert!(iter.valid());
    assert_eq!(iter.key(), b"order:3");
    assert_eq!(iter.value()?, b"shipped");
    iter.next();
    assert_eq!(iter.value()?, b"pending");
    iter.next();
    assert!(!iter.valid());
    iter.close();
    Ok(())
}

#[test]
fn seek_and_rewind() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    seed(&engine)?;

    let mut iter = engine.new_iterator(IteratorOptions::default());
    iter.seek(b"user:b");
    assert_eq!(iter.key(), b"user:bob");
    iter.rewind();
    assert_eq!(iter.key(), b"order:3");
    iter.close();

    let mut iter = engine.new_iterator(IteratorOptions {
        reverse: true,
        ..Default::default()
    });
    iter.seek(b"user:b");
    assert_eq!(iter.key(), b"user:alice");
    iter.close();
    Ok(())
}

#[test]
fn deleted_keys_are_invisible() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    seed(&engine)?;
    engine.delete(b"user:bob")?;

    let mut iter = engine.new_iterator(IteratorOptions {
        prefix: b"user:".to_vec(),
        reverse: false,
    });
    let keys = collect_keys(&mut iter);
    iter.close();
    assert_eq!(keys, vec![b"user:alice".to_vec(), b"user:carol".to_vec()]);
    Ok(())
}

#[test]
fn iterator_snapshot_ignores_later_writes() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());
    engine.put(b"k1", b"v")?;

    let mut iter = engine.new_iterator(IteratorOptions::default());
    engine.put(b"k2", b"v")?;

    let keys = collect_keys(&mut iter);
    iter.close();
    assert_eq!(keys, vec![b"k1".to_vec()]);
    Ok(())
}

#[test]
fn empty_engine_iterator_is_invalid() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path());

    let mut iter = engine.new_iterator(IteratorOptions::default());
    assert!(!iter.valid());
    iter.close();
    Ok(())
}

#[test]
fn iteration_is_identical_across_index_kinds() -> Result<()> {
    for kind in [
        IndexKind::OrderedTree,
        IndexKind::Radix,
        IndexKind::OnDiskBTree,
    ] {
        let dir = tempdir()?;
        let mut options = opts(dir.path());
        options.index_kind = kind;
        let engine = Engine::open(options)?;
        seed(&engine)?;

        let mut iter = engine.new_iterator(IteratorOptions::default());
        let keys = collect_keys(&mut iter);
        iter.close();
        assert_eq!(
            keys,
            vec![
                b"order:3".to_vec(),
                b"order:7".to_vec(),
                b"user:alice".to_vec(),
                b"user:bob".to_vec(),
                b"user:carol".to_vec()
            ],
            "wrong order under {:?}",
            kind
        );
    }
    Ok(())
}
