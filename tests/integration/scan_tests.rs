use dupsweep::fs::{OsFileSystem, SystemClock};
use dupsweep::scanner::{FileCategory, PathWalker, ScanConfig};
use dupsweep::session::{EngineOptions, EventSender, ScanController, ScanState};
use filetime::{set_file_mtime, FileTime};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

fn scan(root: &Path, config: ScanConfig) -> ScanController {
    let mut controller = ScanController::new(
        Arc::new(OsFileSystem::new()),
        Arc::new(SystemClock),
        EventSender::discard(),
        EngineOptions::default().with_io_threads(2),
    );
    controller.start_scan(root, config).unwrap();
    assert_eq!(controller.process().unwrap(), ScanState::Grouped);
    controller
}

fn walked(root: &Path, config: &ScanConfig) -> Vec<PathBuf> {
    let walker = PathWalker::new(Arc::new(OsFileSystem::new()), root, config);
    walker
        .walk()
        .filter_map(Result::ok)
        .map(|record| record.path.strip_prefix(root).unwrap().to_path_buf())
        .collect()
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let controller = scan(dir.path(), ScanConfig::all_files());

    assert!(controller.session().groups().is_empty());
    assert_eq!(controller.session().counters().files_scanned, 0);
}

#[test]
fn test_scan_abc_on_disk() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.txt"), b"AAAAAAAAAA");
    write(&dir.path().join("b.txt"), b"AAAAAAAAAA");
    write(&dir.path().join("c.txt"), b"BBBBBBBBBB");

    let controller = scan(dir.path(), ScanConfig::default());
    let groups = controller.session().groups();

    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].paths(),
        vec![dir.path().join("a.txt"), dir.path().join("b.txt")]
    );
    assert_eq!(controller.session().reclaimable_bytes(), 10);
}

#[test]
fn test_scan_nested_directories() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.bin"), b"duplicate");
    write(&dir.path().join("one/two/three/deep.bin"), b"duplicate");

    let controller = scan(dir.path(), ScanConfig::all_files());

    assert_eq!(controller.session().groups().len(), 1);
    assert_eq!(controller.session().groups()[0].len(), 2);
}

#[test]
fn test_large_files_span_many_chunks() {
    let dir = tempdir().unwrap();
    let mut content = vec![0u8; 300 * 1024];
    for (i, byte) in content.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    write(&dir.path().join("big1.bin"), &content);
    write(&dir.path().join("big2.bin"), &content);
    // same size, last byte differs
    *content.last_mut().unwrap() ^= 0xff;
    write(&dir.path().join("big3.bin"), &content);

    let controller = scan(dir.path(), ScanConfig::all_files());
    let groups = controller.session().groups();

    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].paths(),
        vec![dir.path().join("big1.bin"), dir.path().join("big2.bin")]
    );
}

#[test]
fn test_keeper_is_oldest_on_disk() {
    let dir = tempdir().unwrap();
    for (name, mtime) in [("a.txt", 3_000), ("b.txt", 1_000), ("c.txt", 2_000)] {
        let path = dir.path().join(name);
        write(&path, b"identical");
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    let controller = scan(dir.path(), ScanConfig::all_files());

    assert_eq!(
        controller.session().groups()[0].keeper().unwrap().path,
        dir.path().join("b.txt")
    );
}

#[test]
fn test_category_filter_is_case_insensitive() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("photo.JPG"), b"pixels");
    write(&dir.path().join("clip.mp4"), b"frames");
    write(&dir.path().join("notes.xyz"), b"text");

    let config = ScanConfig::default().with_categories(vec![FileCategory::Image]);
    assert_eq!(walked(dir.path(), &config), vec![PathBuf::from("photo.JPG")]);

    let config = config.with_extra_extensions(vec![".XYZ".to_string()]);
    assert_eq!(
        walked(dir.path(), &config),
        vec![PathBuf::from("notes.xyz"), PathBuf::from("photo.JPG")]
    );
}

#[test]
fn test_size_bounds_are_inclusive() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("empty.txt"), b"");
    write(&dir.path().join("small.txt"), b"12345");
    write(&dir.path().join("large.txt"), b"1234567890");

    assert_eq!(
        walked(dir.path(), &ScanConfig::all_files()),
        vec![PathBuf::from("large.txt"), PathBuf::from("small.txt")]
    );
    let config = ScanConfig::all_files().with_size_bounds(0, 5);
    assert_eq!(
        walked(dir.path(), &config),
        vec![PathBuf::from("empty.txt"), PathBuf::from("small.txt")]
    );
}

#[test]
fn test_excluded_prefix_and_protected_names() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("keep/a.txt"), b"data");
    write(&dir.path().join("skip/b.txt"), b"data");
    write(&dir.path().join("AppData/c.txt"), b"data");
    write(&dir.path().join("nested/Windows/d.txt"), b"data");

    let config = ScanConfig::all_files()
        .with_excluded_prefix(dir.path().join("skip"))
        .with_excluded_dir_names(vec!["AppData".to_string(), "Windows".to_string()]);

    assert_eq!(walked(dir.path(), &config), vec![PathBuf::from("keep/a.txt")]);
}

#[test]
fn test_ignore_patterns() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("src/main.txt"), b"data");
    write(&dir.path().join("build/out.txt"), b"data");
    write(&dir.path().join("debug.log"), b"data");

    let config = ScanConfig::all_files()
        .with_ignore_patterns(vec!["build/".to_string(), "*.log".to_string()]);

    assert_eq!(walked(dir.path(), &config), vec![PathBuf::from("src/main.txt")]);
}

#[test]
fn test_relative_root_honors_absolute_exclusions() {
    // A fixture under the working directory, so it can be named relatively.
    let cwd = std::env::current_dir().unwrap();
    let dir = tempfile::tempdir_in(&cwd).unwrap();
    write(&dir.path().join("a.txt"), b"same");
    write(&dir.path().join("secret/b.txt"), b"same");
    write(&dir.path().join("other/c.txt"), b"same");
    let name = dir.path().file_name().unwrap();

    for root in [
        Path::new(".").join(name),
        Path::new("missing").join("..").join(name),
    ] {
        let config = ScanConfig::all_files().with_excluded_prefix(dir.path().join("secret"));
        let controller = scan(&root, config);
        let session = controller.session();

        assert_eq!(session.root(), dir.path());
        let groups = session.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].paths(),
            vec![dir.path().join("a.txt"), dir.path().join("other/c.txt")]
        );
        assert!(groups[0].paths().iter().all(|p| p.is_absolute()));
    }
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_not_followed() {
    let dir = tempdir().unwrap();
    let outside = tempdir().unwrap();
    write(&dir.path().join("real.txt"), b"content");
    write(&outside.path().join("other.txt"), b"content");
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("outside")).unwrap();
    std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

    let controller = scan(dir.path(), ScanConfig::all_files());

    assert_eq!(controller.session().counters().files_scanned, 1);
    assert!(controller.session().groups().is_empty());
}

#[cfg(unix)]
#[test]
fn test_permission_denied_directory_continues() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    write(&dir.path().join("a.txt"), b"dup");
    write(&dir.path().join("b.txt"), b"dup");
    let locked = dir.path().join("locked");
    write(&locked.join("c.txt"), b"dup");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // root can read anything
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let controller = scan(dir.path(), ScanConfig::all_files());
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(controller.session().warnings().len(), 1);
    assert_eq!(controller.session().warnings()[0].path(), locked.as_path());
    assert_eq!(controller.session().groups()[0].len(), 2);
}

#[test]
fn test_invalid_roots_fail_the_session() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("file.txt");
    write(&file, b"x");

    for root in [dir.path().join("missing"), file] {
        let mut controller = ScanController::new(
            Arc::new(OsFileSystem::new()),
            Arc::new(SystemClock),
            EventSender::discard(),
            EngineOptions::default(),
        );
        assert!(controller.start_scan(&root, ScanConfig::all_files()).is_err());
        assert_eq!(controller.state(), ScanState::Failed);
    }
}
