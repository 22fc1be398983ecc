//! End-to-end tests of the scan state machine over an in-memory filesystem.

use dupsweep::actions::{DeleteMode, DispositionAction, DispositionOptions};
use dupsweep::duplicates::{DispositionStatus, KeepRule, KeeperPolicy, MemberRole};
use dupsweep::error::EngineError;
use dupsweep::fs::{EntryMetadata, FileSystem, FixedClock, MemoryFileSystem, SystemClock};
use dupsweep::scanner::{FileRecord, ScanConfig};
use dupsweep::session::{
    event_channel, EngineEvent, EngineOptions, EventSender, ScanController, ScanState,
};
use chrono::{TimeZone, Utc};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn abc_fixture() -> Arc<MemoryFileSystem> {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_dir("/root");
    fs.add_file("/root/a.txt", b"AAAAAAAAAA", at(100));
    fs.add_file("/root/b.txt", b"AAAAAAAAAA", at(200));
    fs.add_file("/root/c.txt", b"BBBBBBBBBB", at(100));
    fs
}

fn controller(fs: Arc<dyn FileSystem>, events: EventSender) -> ScanController {
    ScanController::new(
        fs,
        Arc::new(SystemClock),
        events,
        EngineOptions::default().with_io_threads(2),
    )
}

// ==================== Grouping Tests ====================

#[test]
fn test_abc_scenario_groups_a_and_b() {
    let fs = abc_fixture();
    let mut controller = controller(fs, EventSender::discard());
    controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();

    assert_eq!(controller.process().unwrap(), ScanState::Grouped);

    let session = controller.session();
    assert_eq!(session.groups().len(), 1);
    let group = &session.groups()[0];
    assert_eq!(
        group.paths(),
        vec![PathBuf::from("/root/a.txt"), PathBuf::from("/root/b.txt")]
    );
    assert_eq!(group.keeper().unwrap().path, PathBuf::from("/root/a.txt"));
    assert_eq!(session.reclaimable_bytes(), 10);
    assert_eq!(session.counters().files_scanned, 3);
    assert_eq!(session.counters().bytes_scanned, 30);
}

#[test]
fn test_keeper_rule_is_pluggable() {
    let fs = abc_fixture();
    let mut controller = ScanController::new(
        fs,
        Arc::new(SystemClock),
        EventSender::discard(),
        EngineOptions::default().with_keeper(Arc::new(KeepRule::NewestModified)),
    );
    controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    controller.process().unwrap();

    let group = &controller.session().groups()[0];
    assert_eq!(group.keeper().unwrap().path, PathBuf::from("/root/b.txt"));
}

/// A policy that answers with an index past the end of every group.
#[derive(Debug)]
struct OutOfRangeKeeper;

impl KeeperPolicy for OutOfRangeKeeper {
    fn select_keeper(&self, _members: &[FileRecord]) -> usize {
        99
    }
}

#[test]
fn test_out_of_range_keeper_never_loses_every_copy() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/d/a", b"same", at(10));
    fs.add_file("/d/b", b"same", at(20));
    let mut controller = ScanController::new(
        Arc::clone(&fs) as Arc<dyn FileSystem>,
        Arc::new(SystemClock),
        EventSender::discard(),
        EngineOptions::default()
            .with_io_threads(2)
            .with_keeper(Arc::new(OutOfRangeKeeper))
            .with_disposition(DispositionOptions::default().with_delete_mode(DeleteMode::Permanent)),
    );
    let handle = controller
        .start_scan(Path::new("/d"), ScanConfig::all_files())
        .unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Grouped);

    let group = &controller.session().groups()[0];
    assert_eq!(group.members.iter().filter(|m| m.is_keeper()).count(), 1);
    assert_eq!(group.keeper().unwrap().path, PathBuf::from("/d/a"));

    controller
        .confirm_disposition(&handle, DispositionAction::Delete)
        .unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Done);

    assert_eq!(fs.files(), vec![PathBuf::from("/d/a")]);
    assert_eq!(controller.summary(&handle).unwrap().files_removed, 1);
}

#[test]
fn test_every_group_has_exactly_one_keeper() {
    let fs = Arc::new(MemoryFileSystem::new());
    for dir in ["x", "y", "z"] {
        for (name, content) in [("one", "1111"), ("two", "22222222"), ("three", "333")] {
            fs.add_file(format!("/root/{dir}/{name}.bin"), content.as_bytes(), at(7));
        }
    }
    let mut controller = controller(fs, EventSender::discard());
    controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    controller.process().unwrap();

    let groups = controller.session().groups();
    assert_eq!(groups.len(), 3);
    for group in groups {
        assert_eq!(group.len(), 3);
        assert_eq!(group.members.iter().filter(|m| m.is_keeper()).count(), 1);
        assert_eq!(
            group.keeper().unwrap().path.parent(),
            Some(Path::new("/root/x"))
        );
    }
    // largest reclaimable first
    assert_eq!(groups[0].size, 8);
    assert_eq!(groups[0].id, 1);

    let counters = controller.session().counters();
    assert_eq!(counters.duplicates_found, 6);
    assert_eq!(counters.bytes_reclaimable, 2 * (4 + 8 + 3));
    assert_eq!(counters.bytes_reclaimable, controller.session().reclaimable_bytes());
}

#[test]
fn test_no_duplicates_reaches_grouped_with_no_groups() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.add_file("/root/a.txt", b"alpha", at(1));
    fs.add_file("/root/b.txt", b"beta!", at(1));
    let mut controller = controller(fs, EventSender::discard());
    controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();

    assert_eq!(controller.process().unwrap(), ScanState::Grouped);
    assert!(controller.session().groups().is_empty());
    assert_eq!(controller.session().reclaimable_bytes(), 0);
    assert_eq!(controller.session().counters().duplicates_found, 0);
}

// ==================== Warning Tests ====================

#[test]
fn test_unreadable_file_is_warned_and_excluded() {
    let fs = abc_fixture();
    fs.add_file("/root/d.txt", b"AAAAAAAAAA", at(50));
    fs.revoke_read("/root/d.txt");
    let (events, rx) = event_channel(256);
    let mut controller = controller(fs, events);
    controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();

    assert_eq!(controller.process().unwrap(), ScanState::Grouped);

    let warnings: Vec<_> = rx
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::Warning { path, .. } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![PathBuf::from("/root/d.txt")]);

    let session = controller.session();
    assert_eq!(session.warnings().len(), 1);
    assert_eq!(session.groups().len(), 1);
    assert!(!session.groups()[0]
        .paths()
        .contains(&PathBuf::from("/root/d.txt")));
}

#[test]
fn test_unreadable_directory_is_warned() {
    let fs = abc_fixture();
    fs.add_file("/root/private/secret.txt", b"AAAAAAAAAA", at(1));
    fs.revoke_read("/root/private");
    let mut controller = controller(fs, EventSender::discard());
    controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();

    assert_eq!(controller.process().unwrap(), ScanState::Grouped);
    assert_eq!(
        controller.session().warnings()[0].path(),
        Path::new("/root/private")
    );
    assert_eq!(controller.session().groups()[0].len(), 2);
}

// ==================== Event Tests ====================

#[test]
fn test_event_stream_order() {
    let fs = abc_fixture();
    let (events, rx) = event_channel(256);
    let mut controller = controller(fs, events);
    let handle = controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    controller.process().unwrap();
    controller
        .confirm_disposition(&handle, DispositionAction::Delete)
        .unwrap();
    controller.process().unwrap();
    drop(controller);

    let events: Vec<EngineEvent> = rx.iter().collect();
    let stages: Vec<ScanState> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::StageChanged { state } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            ScanState::Scanning,
            ScanState::Hashing,
            ScanState::Grouped,
            ScanState::Disposing,
            ScanState::Done
        ]
    );

    let stage_at = |state: ScanState| {
        events
            .iter()
            .position(|e| *e == EngineEvent::StageChanged { state })
            .unwrap()
    };
    let hashing = stage_at(ScanState::Hashing);
    let grouped = stage_at(ScanState::Grouped);
    let last_progress = events
        .iter()
        .rposition(|e| matches!(e, EngineEvent::Progress { .. }))
        .unwrap();
    let groups_ready = events
        .iter()
        .position(|e| matches!(e, EngineEvent::GroupsReady { .. }))
        .unwrap();
    let disposed = events
        .iter()
        .position(|e| matches!(e, EngineEvent::FileDisposed { .. }))
        .unwrap();

    assert!(last_progress < hashing);
    assert!(grouped < groups_ready);
    assert!(groups_ready < disposed);
    assert_eq!(
        events[last_progress],
        EngineEvent::Progress {
            files_scanned: 3,
            bytes_scanned: 30
        }
    );
    match &events[groups_ready] {
        EngineEvent::GroupsReady {
            groups,
            total_reclaimable_bytes,
        } => {
            assert_eq!(groups.len(), 1);
            assert_eq!(*total_reclaimable_bytes, 10);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_small_event_queue_never_drops_events() {
    let fs = Arc::new(MemoryFileSystem::new());
    for i in 0..50 {
        fs.add_file(format!("/root/{i:02}.dat"), format!("{:04}", i % 10).as_bytes(), at(1));
    }
    let (events, rx) = event_channel(1);
    let consumer = std::thread::spawn(move || rx.iter().collect::<Vec<_>>());

    let mut controller = controller(fs, events);
    controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    controller.process().unwrap();
    drop(controller);

    let events = consumer.join().unwrap();
    let progress = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Progress { .. }))
        .count();
    assert_eq!(progress, 50);
}

// ==================== Cancellation Tests ====================

/// Wraps a filesystem and raises the session's cancel flag the first time a
/// chosen file is opened for hashing.
#[derive(Debug)]
struct CancelOnOpen {
    inner: Arc<MemoryFileSystem>,
    trigger: PathBuf,
    flag: Mutex<Option<Arc<AtomicBool>>>,
}

impl CancelOnOpen {
    fn arm(&self, flag: Arc<AtomicBool>) {
        *self.flag.lock().unwrap() = Some(flag);
    }
}

impl FileSystem for CancelOnOpen {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        self.inner.metadata(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        if path == self.trigger {
            if let Some(flag) = self.flag.lock().unwrap().as_ref() {
                flag.store(true, Ordering::SeqCst);
            }
        }
        self.inner.open_read(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.inner.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn trash(&self, path: &Path) -> io::Result<()> {
        self.inner.trash(path)
    }
}

#[test]
fn test_cancel_mid_hashing_has_no_side_effects() {
    let inner = Arc::new(MemoryFileSystem::new());
    for i in 0..20 {
        let content = format!("content-{i:03}");
        inner.add_file(format!("/root/a/{i:02}.txt"), content.as_bytes(), at(1));
        inner.add_file(format!("/root/b/{i:02}.txt"), content.as_bytes(), at(2));
    }
    let before = inner.files();
    let fs = Arc::new(CancelOnOpen {
        inner: Arc::clone(&inner),
        trigger: PathBuf::from("/root/a/00.txt"),
        flag: Mutex::new(None),
    });

    let mut controller = controller(fs.clone(), EventSender::discard());
    let handle = controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    fs.arm(handle.flag());

    assert_eq!(controller.process().unwrap(), ScanState::Cancelled);
    assert!(controller.session().is_cancel_requested());
    assert!(controller.session().finished_at().is_some());

    // A cancelled session cannot be disposed.
    let err = controller
        .confirm_disposition(&handle, DispositionAction::Delete)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            state: ScanState::Cancelled,
            ..
        }
    ));
    assert_eq!(inner.files(), before);
    assert!(inner.trashed().is_empty());
    assert_eq!(controller.summary(&handle).unwrap().files_removed, 0);
}

#[test]
fn test_cancel_flag_before_process_stops_discovery() {
    let fs = abc_fixture();
    let mut controller = controller(fs, EventSender::discard());
    let handle = controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    handle.cancel();

    assert_eq!(controller.process().unwrap(), ScanState::Cancelled);
    assert!(controller.session().groups().is_empty());
}

#[test]
fn test_cancel_terminal_session_is_invalid() {
    let fs = abc_fixture();
    let mut controller = controller(fs, EventSender::discard());
    let handle = controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    controller.cancel(&handle).unwrap();

    assert_eq!(controller.state(), ScanState::Cancelled);
    assert!(matches!(
        controller.cancel(&handle),
        Err(EngineError::InvalidState { .. })
    ));
}

// ==================== Disposition Through The Controller ====================

#[test]
fn test_dispose_twice_is_invalid_state() {
    let fs = abc_fixture();
    let mut controller = controller(fs.clone(), EventSender::discard());
    let handle = controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    controller.process().unwrap();
    controller
        .confirm_disposition(&handle, DispositionAction::Delete)
        .unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Done);

    let again = controller.confirm_disposition(&handle, DispositionAction::Delete);
    assert!(matches!(
        again,
        Err(EngineError::InvalidState {
            state: ScanState::Done,
            ..
        })
    ));
    assert_eq!(fs.trashed(), vec![PathBuf::from("/root/b.txt")]);
}

#[test]
fn test_summary_matches_disposed_sizes() {
    let fs = abc_fixture();
    fs.add_file("/root/sub/a-copy.txt", b"AAAAAAAAAA", at(300));
    fs.add_file("/root/sub/big1.bin", &[7u8; 4096], at(1));
    fs.add_file("/root/sub/big2.bin", &[7u8; 4096], at(2));
    fs.lock("/root/sub/a-copy.txt");

    let mut controller = controller(fs.clone(), EventSender::discard());
    let handle = controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    controller.process().unwrap();
    controller
        .confirm_disposition(&handle, DispositionAction::MoveTo(PathBuf::from("/quarantine")))
        .unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Done);

    let summary = controller.summary(&handle).unwrap();
    let disposed: u64 = controller
        .session()
        .groups()
        .iter()
        .flat_map(|g| g.members.iter().map(move |m| (g.size, &m.role)))
        .filter(|(_, role)| {
            matches!(
                role,
                MemberRole::Disposable(DispositionStatus::Moved { .. })
            )
        })
        .map(|(size, _)| size)
        .sum();
    assert_eq!(summary.bytes_reclaimed, disposed);
    assert_eq!(summary.bytes_reclaimed, 4096 + 10);
    assert_eq!(summary.files_removed, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].path, PathBuf::from("/root/sub/a-copy.txt"));

    // keepers stay where they were
    for group in controller.session().groups() {
        assert!(fs.contains(&group.keeper().unwrap().path));
    }
    assert!(fs.contains("/quarantine/b.txt"));
    assert!(fs.contains("/quarantine/sub/big2.bin"));
}

#[test]
fn test_timestamps_follow_injected_clock() {
    let fs = abc_fixture();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut controller = ScanController::new(
        fs,
        Arc::new(FixedClock(now)),
        EventSender::discard(),
        EngineOptions::default(),
    );
    let handle = controller
        .start_scan(Path::new("/root"), ScanConfig::all_files())
        .unwrap();
    controller.process().unwrap();
    controller.cancel(&handle).unwrap();

    assert_eq!(controller.session().started_at(), Some(now));
    assert_eq!(controller.session().finished_at(), Some(now));
}
