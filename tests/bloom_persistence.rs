//! Bloom deduper snapshot persistence against a real temp filesystem.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use crawlsentry::bloom::BloomDeduper;

#[test]
fn persisted_snapshot_restores_seen_state_into_a_fresh_deduper() {
    let temp = TempDir::new().unwrap();
    let snapshot_file = temp.child("bloom.snapshot");

    let original = BloomDeduper::new(1000, 0.01);
    original.add("https://example.com/a");
    original.add("https://example.com/b");
    original.persist(snapshot_file.path()).unwrap();

    assert!(snapshot_file.path().is_file());

    let restored = BloomDeduper::new(1000, 0.01);
    assert!(!restored.seen("https://example.com/a"));
    restored.load(snapshot_file.path()).unwrap();

    assert!(restored.seen("https://example.com/a"));
    assert!(restored.seen("https://example.com/b"));
    assert_eq!(restored.stats().count, original.stats().count);
}

#[test]
fn persist_is_atomic_via_rename_leaving_no_stray_temp_file() {
    let temp = TempDir::new().unwrap();
    let snapshot_file = temp.child("bloom.snapshot");

    let deduper = BloomDeduper::new(1000, 0.01);
    deduper.add("https://example.com/a");
    deduper.persist(snapshot_file.path()).unwrap();

    assert!(snapshot_file.path().is_file());
    assert!(!temp.child("bloom.snapshot.tmp").path().exists());
}

#[test]
fn load_rejects_a_snapshot_from_a_differently_shaped_deduper() {
    let temp = TempDir::new().unwrap();
    let snapshot_file = temp.child("bloom.snapshot");

    let small = BloomDeduper::new(100, 0.01);
    small.persist(snapshot_file.path()).unwrap();

    let large = BloomDeduper::new(1_000_000, 0.0001);
    assert!(large.load(snapshot_file.path()).is_err());
}
