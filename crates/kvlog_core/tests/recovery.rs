//! End-to-end crash and recovery scenarios.
//!
//! These tests exercise the full open/mutate/close lifecycle against a real
//! data directory. A "crash" is simulated by dropping the store without
//! calling `close()`, which leaves the WAL in place and skips the snapshot.

use kvlog_core::{Config, DataDir, Record, Store, StoreError, Wal};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn wal_size(path: &Path) -> u64 {
    fs::metadata(path.join("wal.log")).map(|m| m.len()).unwrap_or(0)
}

#[test]
fn simple_round_trip_through_close_and_reopen() {
    let temp = tempdir().unwrap();

    let store = Store::open(temp.path()).unwrap();
    store.set("k1", b"k1 value").unwrap();
    assert_eq!(store.get("k1"), Some(b"k1 value".to_vec()));
    store.close().unwrap();

    let store = Store::open(temp.path()).unwrap();
    assert_eq!(store.get("k1"), Some(b"k1 value".to_vec()));
    assert_eq!(store.len(), 1);
    store.close().unwrap();
}

#[test]
fn crash_recovery_without_close() {
    let temp = tempdir().unwrap();

    {
        let store = Store::open(temp.path()).unwrap();
        store.set("key1", b"value1").unwrap();
        store.set("key2", b"value2").unwrap();
        store.set("key3", b"value3").unwrap();
        // crash: no close
    }

    let store = Store::open(temp.path()).unwrap();
    assert_eq!(store.len(), 3);
    assert_eq!(store.get("key1"), Some(b"value1".to_vec()));
    assert_eq!(store.get("key2"), Some(b"value2".to_vec()));
    assert_eq!(store.get("key3"), Some(b"value3".to_vec()));
    store.close().unwrap();
}

#[test]
fn overwrite_and_delete_across_crash() {
    let temp = tempdir().unwrap();

    {
        let store = Store::open(temp.path()).unwrap();
        store.set("key1", b"value1").unwrap();
        store.set("key2", b"value2").unwrap();
        store.delete("key1").unwrap();
        store.set("key1", b"value3").unwrap();
        // crash
    }

    let store = Store::open(temp.path()).unwrap();
    assert_eq!(store.get("key1"), Some(b"value3".to_vec()));
    assert_eq!(store.get("key2"), Some(b"value2".to_vec()));
    assert_eq!(store.len(), 2);
    store.close().unwrap();
}

#[test]
fn clean_shutdown_uses_snapshot_and_empties_wal() {
    let temp = tempdir().unwrap();

    let store = Store::open(temp.path()).unwrap();
    store.set("key1", b"value1").unwrap();
    store.set("key2", b"value2").unwrap();
    store.close().unwrap();

    assert!(temp.path().join("snapshot.dat").exists());
    assert_eq!(wal_size(temp.path()), 0);

    let store = Store::open(temp.path()).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("key1"), Some(b"value1".to_vec()));
    assert_eq!(store.get("key2"), Some(b"value2".to_vec()));
    store.close().unwrap();
}

#[test]
fn snapshot_plus_wal_recovery() {
    let temp = tempdir().unwrap();

    // first generation lands in the snapshot
    let store = Store::open(temp.path()).unwrap();
    store.set("old", b"from snapshot").unwrap();
    store.close().unwrap();

    // second generation lands only in the WAL
    {
        let store = Store::open(temp.path()).unwrap();
        store.set("new", b"from wal").unwrap();
        // crash
    }

    let store = Store::open(temp.path()).unwrap();
    assert_eq!(store.get("old"), Some(b"from snapshot".to_vec()));
    assert_eq!(store.get("new"), Some(b"from wal".to_vec()));
    assert_eq!(store.len(), 2);
    store.close().unwrap();
}

#[test]
fn wal_delete_shadows_snapshot_entry() {
    let temp = tempdir().unwrap();

    let store = Store::open(temp.path()).unwrap();
    store.set("doomed", b"still here").unwrap();
    store.close().unwrap();

    {
        let store = Store::open(temp.path()).unwrap();
        store.delete("doomed").unwrap();
        // crash: the delete exists only in the WAL
    }

    let store = Store::open(temp.path()).unwrap();
    assert_eq!(store.get("doomed"), None);
    assert!(store.is_empty());
    store.close().unwrap();
}

#[test]
fn delete_of_absent_key_replays_harmlessly() {
    let temp = tempdir().unwrap();

    {
        let store = Store::open(temp.path()).unwrap();
        store.delete("ghost").unwrap();
        // crash
    }

    let store = Store::open(temp.path()).unwrap();
    assert!(store.is_empty());
    store.close().unwrap();
}

#[test]
fn second_open_reproduces_identical_map() {
    let temp = tempdir().unwrap();

    let store = Store::open(temp.path()).unwrap();
    store.set("a", b"1").unwrap();
    store.set("b", b"2").unwrap();
    store.delete("a").unwrap();
    store.close().unwrap();

    let store = Store::open(temp.path()).unwrap();
    let mut first = store.keys();
    first.sort();
    let first_value = store.get("b");
    store.close().unwrap();

    let store = Store::open(temp.path()).unwrap();
    let mut second = store.keys();
    second.sort();
    assert_eq!(first, second);
    assert_eq!(store.get("b"), first_value);
    store.close().unwrap();
}

#[test]
fn any_bit_flip_in_final_record_is_survivable() {
    let temp = tempdir().unwrap();

    {
        let store = Store::open(temp.path()).unwrap();
        store.set("key1", b"value1").unwrap();
        store.set("key2", b"value2").unwrap();
        store.set("key3", b"value3").unwrap();
        // crash
    }

    let wal_path = temp.path().join("wal.log");
    let pristine = fs::read(&wal_path).unwrap();

    // every record here is 13 + 4 + 4 + 4 + 6 + 4 = 35 bytes
    let record_len = pristine.len() / 3;
    assert_eq!(pristine.len(), 3 * record_len);
    let final_start = 2 * record_len;

    for pos in final_start..pristine.len() {
        for mask in [0x01u8, 0x80] {
            let mut mutated = pristine.clone();
            mutated[pos] ^= mask;
            fs::write(&wal_path, &mutated).unwrap();

            let store = Store::open(temp.path())
                .unwrap_or_else(|e| panic!("open failed after flipping {mask:#04x} at byte {pos}: {e}"));
            assert_eq!(store.get("key1"), Some(b"value1".to_vec()), "byte {pos}");
            assert_eq!(store.get("key2"), Some(b"value2".to_vec()), "byte {pos}");
            assert_eq!(store.get("key3"), None, "byte {pos}");
            assert_eq!(store.len(), 2, "byte {pos}");
            drop(store);
        }
    }
}

#[test]
fn torn_tail_is_discarded_on_recovery() {
    let temp = tempdir().unwrap();

    {
        let store = Store::open(temp.path()).unwrap();
        store.set("key1", b"value1").unwrap();
        store.set("key2", b"value2").unwrap();
        // crash
    }

    let wal_path = temp.path().join("wal.log");
    let pristine = fs::read(&wal_path).unwrap();
    let record_len = pristine.len() / 2;

    // cut the final record at several points, from one missing byte to
    // almost nothing written
    for kept in [record_len + 1, record_len + 17, pristine.len() - 1] {
        fs::write(&wal_path, &pristine[..kept]).unwrap();

        let store = Store::open(temp.path()).unwrap();
        assert_eq!(store.get("key1"), Some(b"value1".to_vec()), "kept {kept}");
        assert_eq!(store.get("key2"), None, "kept {kept}");
        assert_eq!(store.len(), 1, "kept {kept}");
        drop(store);
    }
}

#[test]
fn unknown_op_codes_are_skipped_around_valid_records() {
    let temp = tempdir().unwrap();

    {
        let store = Store::open(temp.path()).unwrap();
        store.set("key1", b"value1").unwrap();
        // crash
    }

    // splice in a record from "the future" followed by a valid one
    {
        let dir = DataDir::open(temp.path()).unwrap();
        let wal = Wal::open(&dir, true).unwrap();
        wal.append(&Record {
            op: 0x03,
            timestamp: 0,
            key: "future-key".to_string(),
            value: b"future-payload".to_vec(),
        })
        .unwrap();
        wal.append(&Record::set("key3", b"value3")).unwrap();
        wal.close().unwrap();
    }

    let store = Store::open(temp.path()).unwrap();
    assert_eq!(store.get("key1"), Some(b"value1".to_vec()));
    assert_eq!(store.get("key3"), Some(b"value3".to_vec()));
    assert_eq!(store.get("future-key"), None);
    assert_eq!(store.len(), 2);
    store.close().unwrap();
}

#[test]
fn corrupt_snapshot_refuses_to_open() {
    let temp = tempdir().unwrap();

    let store = Store::open(temp.path()).unwrap();
    store.set("key1", b"value1").unwrap();
    store.close().unwrap();

    let snapshot_path = temp.path().join("snapshot.dat");
    let mut bytes = fs::read(&snapshot_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&snapshot_path, &bytes).unwrap();

    match Store::open(temp.path()) {
        Err(StoreError::SnapshotCorrupt { .. }) | Err(StoreError::ChecksumMismatch { .. }) => {}
        other => panic!("expected snapshot corruption to fail open, got {other:?}"),
    }
}

#[test]
fn concurrent_writers_to_the_same_key() {
    let temp = tempdir().unwrap();
    let store = Store::open(temp.path()).unwrap();

    let payloads: Vec<Vec<u8>> = (0..100).map(|i| format!("value-{i}").into_bytes()).collect();

    let store_ref = &store;
    std::thread::scope(|scope| {
        for payload in &payloads {
            scope.spawn(move || {
                store_ref.set("shared-key", payload).unwrap();
            });
        }
    });

    let value = store.get("shared-key").expect("key must exist after all writers joined");
    assert!(!value.is_empty());
    assert!(
        payloads.contains(&value),
        "final value must be one some thread wrote"
    );
    assert_eq!(store.len(), 1);
    store.close().unwrap();
}

#[test]
fn concurrent_readers_and_writers_on_disjoint_keys() {
    let temp = tempdir().unwrap();
    let store = Store::open(temp.path()).unwrap();

    let store_ref = &store;
    std::thread::scope(|scope| {
        for i in 0..8 {
            scope.spawn(move || {
                let key = format!("writer-{i}");
                for n in 0..50 {
                    store_ref.set(&key, format!("{n}").as_bytes()).unwrap();
                }
            });
        }
        for _ in 0..4 {
            scope.spawn(move || {
                for _ in 0..200 {
                    let _ = store_ref.get("writer-0");
                    let _ = store_ref.len();
                }
            });
        }
    });

    assert_eq!(store.len(), 8);
    for i in 0..8 {
        assert_eq!(store.get(&format!("writer-{i}")), Some(b"49".to_vec()));
    }
    store.close().unwrap();
}

#[test]
fn unsynced_writes_still_recover_within_the_same_host() {
    let temp = tempdir().unwrap();

    {
        let store =
            Store::open_with_config(temp.path(), Config::new().sync_writes(false)).unwrap();
        store.set("key1", b"value1").unwrap();
        // crash: with sync_writes off the bytes are only in the page cache,
        // which survives a process exit
    }

    let store = Store::open(temp.path()).unwrap();
    assert_eq!(store.get("key1"), Some(b"value1".to_vec()));
    store.close().unwrap();
}

#[test]
fn on_disk_layout_is_exactly_two_files() {
    let temp = tempdir().unwrap();

    let store = Store::open(temp.path()).unwrap();
    store.set("k", b"v").unwrap();
    store.close().unwrap();

    let mut names: Vec<String> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["snapshot.dat".to_string(), "wal.log".to_string()]);
}
