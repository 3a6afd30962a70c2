//! Literal scenario tests S1-S6 against `FileBackend` and `tempfile::tempdir()`.

use onion_store::{OnionConfig, OnionError, OnionHandle, RevisionSelector};

fn config(page_size: u32) -> OnionConfig {
    OnionConfig::new(page_size, 0)
}

#[test]
fn s1_create_write_close_reopen_latest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");

    let mut handle = OnionHandle::open_create_truncate(&path, config(512)).unwrap();
    handle.write(0, b"hello").unwrap();
    handle.close().unwrap();

    let mut handle = OnionHandle::open_read_only(&path, config(512)).unwrap();
    assert_eq!(handle.read(0, 5).unwrap(), b"hello");
    assert_eq!(handle.read(5, 507).unwrap(), vec![0u8; 507]);
    assert_eq!(handle.logi_eof(), 5);
}

#[test]
fn s2_second_revision_overlays_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");

    let mut handle = OnionHandle::open_create_truncate(&path, config(512)).unwrap();
    handle.write(0, b"hello").unwrap();
    handle.close().unwrap();

    let mut handle = OnionHandle::open_read_write(&path, config(512)).unwrap();
    handle.write(5, b"WORLD").unwrap();
    handle.close().unwrap();

    let mut rev0 = OnionHandle::open_read_only(&path, config(512).with_revision(RevisionSelector::Id(0))).unwrap();
    let mut expected_rev0 = b"hello".to_vec();
    expected_rev0.extend_from_slice(&[0u8; 5]);
    assert_eq!(rev0.read(0, 10).unwrap(), expected_rev0);

    let mut rev1 = OnionHandle::open_read_only(&path, config(512).with_revision(RevisionSelector::Id(1))).unwrap();
    assert_eq!(rev1.read(0, 10).unwrap(), b"helloWORLD");
}

#[test]
fn s3_rewriting_a_page_allocates_a_distinct_slot_in_the_new_revision() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");

    let mut handle = OnionHandle::open_create_truncate(&path, config(512)).unwrap();
    handle.write(0, b"hello").unwrap();
    handle.close().unwrap();

    let mut handle = OnionHandle::open_read_write(&path, config(512)).unwrap();
    handle.write(5, b"WORLD").unwrap();
    handle.close().unwrap();

    let onion_path = onion_store::sidecar_paths(&path).0;
    let size_before = std::fs::metadata(&onion_path).unwrap().len();

    let mut handle = OnionHandle::open_read_write(&path, config(512)).unwrap();
    handle.write(0, b"H").unwrap();
    handle.close().unwrap();

    let size_after = std::fs::metadata(&onion_path).unwrap().len();
    assert!(size_after - size_before >= 512, "onion file must grow by at least one page");

    let rev1 = OnionHandle::open_read_only(&path, config(512).with_revision(RevisionSelector::Id(1))).unwrap();
    let rev1_phys = rev1.archival_entries().iter().find(|e| e.logi_addr == 0).unwrap().phys_addr;

    let rev2 = OnionHandle::open_read_only(&path, config(512).with_revision(RevisionSelector::Id(2))).unwrap();
    let rev2_phys = rev2.archival_entries().iter().find(|e| e.logi_addr == 0).unwrap().phys_addr;

    assert_ne!(rev1_phys, rev2_phys);
}

#[test]
fn s4_read_write_refuses_while_write_lock_held() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");

    // Deliberately not closed: the write lock stays set.
    let _handle = OnionHandle::open_create_truncate(&path, config(512)).unwrap();

    let err = OnionHandle::open_read_write(&path, config(512)).unwrap_err();
    assert!(matches!(err, OnionError::Unsupported(_)));

    let err = OnionHandle::open_read_only(&path, config(512)).unwrap_err();
    assert!(matches!(err, OnionError::Unsupported(_)));
}

#[test]
fn s5_corrupted_revision_record_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");

    let mut handle = OnionHandle::open_create_truncate(&path, config(512)).unwrap();
    handle.write(0, b"hello").unwrap();
    handle.close().unwrap();

    let onion_path = onion_store::sidecar_paths(&path).0;
    let mut bytes = std::fs::read(&onion_path).unwrap();
    // Header (40 bytes) + one 512-byte page puts the revision record at 552.
    let record_start = 40 + 512;
    bytes[record_start + 8] ^= 0xff;
    std::fs::write(&onion_path, bytes).unwrap();

    let err = OnionHandle::open_read_only(&path, config(512)).unwrap_err();
    assert!(matches!(err, OnionError::Corrupt { .. }));
}

#[test]
fn s6_page_alignment_flag_keeps_every_phys_addr_page_aligned() {
    use onion_store::CreationFlags;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let page_size = 4096u32;

    let flags = CreationFlags { divergent_history: false, page_alignment: true };
    let mut handle =
        OnionHandle::open_create_truncate(&path, config(page_size).with_creation_flags(flags)).unwrap();
    handle.write(0, b"alpha").unwrap();
    handle.close().unwrap();

    for _ in 0..3 {
        let mut handle =
            OnionHandle::open_read_write(&path, config(page_size).with_creation_flags(flags)).unwrap();
        handle.write(0, b"beta").unwrap();
        handle.close().unwrap();
    }

    let latest = OnionHandle::open_read_only(&path, config(page_size).with_creation_flags(flags)).unwrap();
    for entry in latest.archival_entries() {
        assert_eq!(entry.phys_addr % u64::from(page_size), 0);
    }
    assert_eq!(latest.stats().history_eof % u64::from(page_size), 0);
}
