use std::fs;
use std::sync::Arc;

use logvault::archive::ArchiveFormat;
use logvault::lifecycle::{RetentionWindow, RotationManager, RotationSchedule};
use logvault::{LogStore, Month};
use tempfile::tempdir;
use time::macros::datetime;

#[test]
fn sweep_then_serve_from_archives() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    for (owner, month, name, data) in [
        ("alice", "2023-10", "a.log", "alice october"),
        ("alice", "2024-05", "b.log", "alice may"),
        ("bob", "2023-12", "c.log", "bob december"),
    ] {
        let month_dir = root.join(owner).join(month);
        fs::create_dir_all(&month_dir).expect("mkdir");
        fs::write(month_dir.join(name), data).expect("write");
    }

    let store = Arc::new(LogStore::new(root, ArchiveFormat::Xz).expect("store"));
    let manager = RotationManager::new(
        Arc::clone(&store),
        RetentionWindow::default(),
        RotationSchedule::default(),
    );
    let report = manager.sweep(datetime!(2024-05-20 12:00 UTC));
    assert!(!report.has_errors(), "{:?}", report.errors);
    assert_eq!(report.created.len(), 2);
    assert!(store.cache().is_empty());

    let october = Month::parse("2023-10").expect("month");
    let december = Month::parse("2023-12").expect("month");
    assert!(root.join("alice/2023-10.tar.xz").is_file());
    assert!(root.join("alice/2024-05/b.log").is_file());
    assert_eq!(store.read("alice", october, "a.log").expect("a"), b"alice october");
    assert_eq!(store.read("bob", december, "c.log").expect("c"), b"bob december");
    assert_eq!(store.cache().len(), 2);
}

#[cfg(unix)]
#[test]
fn one_failing_month_does_not_stop_the_sweep() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    for owner in ["alice", "bob"] {
        let month_dir = root.join(owner).join("2024-01");
        fs::create_dir_all(&month_dir).expect("mkdir");
        fs::write(month_dir.join("x.log"), owner).expect("write");
    }
    // A symlink pointing at itself cannot be resolved, even by root.
    std::os::unix::fs::symlink("2024-01.tar.zst", root.join("alice/2024-01.tar.zst"))
        .expect("symlink");

    let store = Arc::new(LogStore::new(root, ArchiveFormat::Zstd).expect("store"));
    let manager = RotationManager::new(
        Arc::clone(&store),
        RetentionWindow::default(),
        RotationSchedule::default(),
    );
    let report = manager.sweep(datetime!(2024-05-20 12:00 UTC));

    assert_eq!(report.scanned_count, 2);
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert!(report.errors[0].contains("alice/2024-01"), "{}", report.errors[0]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.created, vec![root.join("bob/2024-01.tar.zst")]);

    assert!(root.join("bob/2024-01.tar.zst").is_file());
    assert!(root.join("alice/2024-01/x.log").is_file());
    let stray: Vec<_> = fs::read_dir(root.join("alice"))
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert!(stray.is_empty());
}
