//! Move and delete on a real filesystem.

use dupsweep::actions::{DeleteMode, DispositionAction, DispositionOptions, MoveLayout};
use dupsweep::fs::{OsFileSystem, SystemClock};
use dupsweep::scanner::ScanConfig;
use dupsweep::session::{EngineOptions, EventSender, ScanController, ScanState, SessionHandle};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write(path: &Path, content: &[u8], mtime: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

fn grouped(root: &Path, options: DispositionOptions) -> (ScanController, SessionHandle) {
    let mut controller = ScanController::new(
        Arc::new(OsFileSystem::new()),
        Arc::new(SystemClock),
        EventSender::discard(),
        EngineOptions::default()
            .with_io_threads(2)
            .with_disposition(options),
    );
    let handle = controller
        .start_scan(root, ScanConfig::all_files())
        .unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Grouped);
    (controller, handle)
}

#[test]
fn test_flat_move_collision_gets_suffix() {
    let scan = tempdir().unwrap();
    let dest = tempdir().unwrap();
    write(&scan.path().join("keep1/photo.jpg"), b"first photo, larger", 1_000);
    write(&scan.path().join("dupes1/photo.jpg"), b"first photo, larger", 2_000);
    write(&scan.path().join("keep2/photo.jpg"), b"second", 1_000);
    write(&scan.path().join("dupes2/photo.jpg"), b"second", 2_000);

    let (mut controller, handle) = grouped(
        scan.path(),
        DispositionOptions::default().with_layout(MoveLayout::Flat),
    );
    controller
        .confirm_disposition(&handle, DispositionAction::MoveTo(dest.path().to_path_buf()))
        .unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Done);

    let summary = controller.summary(&handle).unwrap();
    assert_eq!(summary.files_removed, 2);
    assert!(summary.all_succeeded());
    assert_eq!(
        fs::read(dest.path().join("photo.jpg")).unwrap(),
        b"first photo, larger"
    );
    assert_eq!(fs::read(dest.path().join("photo_1.jpg")).unwrap(), b"second");
    assert!(!scan.path().join("dupes1/photo.jpg").exists());
    assert!(!scan.path().join("dupes2/photo.jpg").exists());
    assert!(scan.path().join("keep1/photo.jpg").exists());
    assert!(scan.path().join("keep2/photo.jpg").exists());
}

#[test]
fn test_move_never_overwrites_existing_destination() {
    let scan = tempdir().unwrap();
    let dest = tempdir().unwrap();
    write(&scan.path().join("a.txt"), b"duplicate", 1_000);
    write(&scan.path().join("b.txt"), b"duplicate", 2_000);
    fs::write(dest.path().join("b.txt"), b"already here").unwrap();

    let (mut controller, handle) = grouped(scan.path(), DispositionOptions::default());
    controller
        .confirm_disposition(&handle, DispositionAction::MoveTo(dest.path().to_path_buf()))
        .unwrap();
    controller.process().unwrap();

    assert_eq!(fs::read(dest.path().join("b.txt")).unwrap(), b"already here");
    assert_eq!(fs::read(dest.path().join("b_1.txt")).unwrap(), b"duplicate");
    assert_eq!(controller.summary(&handle).unwrap().bytes_reclaimed, 9);
}

#[test]
fn test_mirror_layout_keeps_relative_structure() {
    let scan = tempdir().unwrap();
    let dest = tempdir().unwrap();
    write(&scan.path().join("originals/song.mp3"), b"la la la", 1_000);
    write(&scan.path().join("backup/2020/song.mp3"), b"la la la", 2_000);

    let (mut controller, handle) = grouped(scan.path(), DispositionOptions::default());
    controller
        .confirm_disposition(&handle, DispositionAction::MoveTo(dest.path().to_path_buf()))
        .unwrap();
    controller.process().unwrap();

    assert!(dest.path().join("backup/2020/song.mp3").is_file());
    assert!(scan.path().join("originals/song.mp3").is_file());
}

#[test]
fn test_permanent_delete_removes_only_disposables() {
    let scan = tempdir().unwrap();
    write(&scan.path().join("a.txt"), b"AAAAAAAAAA", 1_000);
    write(&scan.path().join("b.txt"), b"AAAAAAAAAA", 2_000);
    write(&scan.path().join("c.txt"), b"AAAAAAAAAA", 3_000);
    write(&scan.path().join("unique.txt"), b"BBBBBBBBBB", 3_000);

    let (mut controller, handle) = grouped(
        scan.path(),
        DispositionOptions::default().with_delete_mode(DeleteMode::Permanent),
    );
    controller
        .confirm_disposition(&handle, DispositionAction::Delete)
        .unwrap();
    controller.process().unwrap();

    let summary = controller.summary(&handle).unwrap();
    assert_eq!(summary.files_removed, 2);
    assert_eq!(summary.bytes_reclaimed, 20);
    assert!(scan.path().join("a.txt").exists());
    assert!(!scan.path().join("b.txt").exists());
    assert!(!scan.path().join("c.txt").exists());
    assert!(scan.path().join("unique.txt").exists());
}

#[test]
fn test_file_modified_after_grouping_is_left_alone() {
    let scan = tempdir().unwrap();
    write(&scan.path().join("a.txt"), b"same bytes", 1_000);
    write(&scan.path().join("b.txt"), b"same bytes", 2_000);

    let (mut controller, handle) = grouped(
        scan.path(),
        DispositionOptions::default().with_delete_mode(DeleteMode::Permanent),
    );
    fs::write(scan.path().join("b.txt"), b"edited since the scan").unwrap();

    controller
        .confirm_disposition(&handle, DispositionAction::Delete)
        .unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Done);

    let summary = controller.summary(&handle).unwrap();
    assert_eq!(summary.files_removed, 0);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(
        fs::read(scan.path().join("b.txt")).unwrap(),
        b"edited since the scan"
    );
}

#[cfg(unix)]
#[test]
fn test_unwritable_destination_is_isolated_per_file() {
    use std::os::unix::fs::PermissionsExt;

    let scan = tempdir().unwrap();
    let dest = tempdir().unwrap();
    write(&scan.path().join("a.txt"), b"one", 1_000);
    write(&scan.path().join("b.txt"), b"one", 2_000);
    fs::set_permissions(dest.path(), fs::Permissions::from_mode(0o500)).unwrap();

    // root ignores directory permissions
    if fs::write(dest.path().join("write-check"), b"x").is_ok() {
        return;
    }

    let (mut controller, handle) = grouped(scan.path(), DispositionOptions::default());
    controller
        .confirm_disposition(
            &handle,
            DispositionAction::MoveTo(dest.path().join("nested")),
        )
        .unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Done);

    let summary = controller.summary(&handle).unwrap();
    assert_eq!(summary.files_removed, 0);
    assert_eq!(summary.failures.len(), 1);
    assert!(scan.path().join("b.txt").exists());

    fs::set_permissions(dest.path(), fs::Permissions::from_mode(0o700)).unwrap();
}
