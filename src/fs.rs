//! Filesystem and clock abstractions consumed by the engine.
//!
//! Every component that touches the disk goes through [`FileSystem`], and
//! every timestamp the engine records comes from a [`Clock`]. Both are
//! injected into the [`ScanController`](crate::session::ScanController),
//! so tests can substitute [`MemoryFileSystem`] and [`FixedClock`].
//!
//! # Example
//!
//! ```
//! use dupsweep::fs::{FileSystem, MemoryFileSystem};
//! use std::path::Path;
//! use std::time::SystemTime;
//!
//! let fs = MemoryFileSystem::new();
//! fs.add_file("/data/a.txt", b"hello", SystemTime::UNIX_EPOCH);
//!
//! let children = fs.read_dir(Path::new("/data")).unwrap();
//! assert_eq!(children.len(), 1);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// Kind of a filesystem entry, as reported without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link or junction (never followed).
    Symlink,
    /// Sockets, devices, FIFOs and anything else.
    Other,
}

/// Metadata snapshot for a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Entry kind
    pub kind: EntryKind,
    /// Length in bytes (0 for directories)
    pub len: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl EntryMetadata {
    /// Whether this entry is a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Whether this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// The filesystem operations the engine needs.
///
/// `metadata` must not follow symbolic links: the walker relies on seeing
/// [`EntryKind::Symlink`] to avoid cycles.
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    /// List the direct children of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Stat an entry without following symlinks.
    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata>;

    /// Open a file for streaming reads.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Move a file. Must fail rather than overwrite an existing destination.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Permanently remove a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Move a file to the platform recycle bin.
    fn trash(&self, path: &Path) -> io::Result<()>;

    /// Whether any entry exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    /// Make `path` absolute without touching the disk.
    ///
    /// Relative paths are joined to the current directory, then `.` and
    /// `..` are resolved lexically. Symlinks are not resolved.
    fn absolute(&self, path: &Path) -> io::Result<PathBuf> {
        if path.has_root() {
            return Ok(normalize_lexically(path));
        }
        std::path::absolute(path).map(|p| normalize_lexically(&p))
    }
}

/// Resolve `.` and `..` components without consulting the filesystem.
///
/// `..` at the root stays at the root.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// [`FileSystem`] backed by the real operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    /// Create a new OS-backed filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for OsFileSystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        let metadata = fs::symlink_metadata(path)?;
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        Ok(EntryMetadata {
            kind,
            len: if kind == EntryKind::File {
                metadata.len()
            } else {
                0
            },
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path)?;
        Ok(Box::new(file))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        // A hard link fails atomically when `to` exists, unlike fs::rename.
        match fs::hard_link(from, to) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
            Err(link_err) => {
                // Cross-device, or a filesystem without hard links.
                log::debug!(
                    "link {} -> {} failed ({}), trying copy",
                    from.display(),
                    to.display(),
                    link_err
                );
                copy_no_clobber(from, to)?;
            }
        }

        if let Err(remove_err) = fs::remove_file(from) {
            let _ = fs::remove_file(to);
            return Err(remove_err);
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn trash(&self, path: &Path) -> io::Result<()> {
        trash::delete(path).map_err(|e| io::Error::other(e.to_string()))
    }
}

/// Copy `from` into a newly created `to`, never replacing an existing file.
///
/// A failed copy removes the partial destination.
fn copy_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    let mut source = fs::File::open(from)?;
    let permissions = source.metadata()?.permissions();
    let mut dest = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(to)?;

    let copied = io::copy(&mut source, &mut dest)
        .and_then(|_| dest.sync_all())
        .and_then(|()| fs::set_permissions(to, permissions));
    if let Err(e) = copied {
        drop(dest);
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum MemNode {
    Dir,
    File { data: Vec<u8>, modified: SystemTime },
    Symlink,
}

#[derive(Debug, Default)]
struct MemState {
    nodes: BTreeMap<PathBuf, MemNode>,
    unreadable: HashSet<PathBuf>,
    locked: HashSet<PathBuf>,
    trashed: Vec<PathBuf>,
}

/// In-memory [`FileSystem`] with fault injection, used by tests and benches.
///
/// Paths are treated literally; callers should use absolute paths such as
/// `/data/a.txt`. Parent directories are created implicitly.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemState>,
}

fn permission_denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("permission denied: {}", path.display()),
    )
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl MemoryFileSystem {
    /// Create an empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, MemState> {
        // A poisoned lock only means a test thread panicked mid-operation.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_parents(state: &mut MemState, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            state
                .nodes
                .entry(ancestor.to_path_buf())
                .or_insert(MemNode::Dir);
        }
    }

    /// Add a directory (and its parents).
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.lock_state();
        Self::insert_parents(&mut state, path);
        state.nodes.insert(path.to_path_buf(), MemNode::Dir);
    }

    /// Add or replace a file with the given content and modification time.
    pub fn add_file(&self, path: impl AsRef<Path>, data: &[u8], modified: SystemTime) {
        let path = path.as_ref();
        let mut state = self.lock_state();
        Self::insert_parents(&mut state, path);
        state.nodes.insert(
            path.to_path_buf(),
            MemNode::File {
                data: data.to_vec(),
                modified,
            },
        );
    }

    /// Add a symbolic link entry. Links are never resolved.
    pub fn add_symlink(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.lock_state();
        Self::insert_parents(&mut state, path);
        state.nodes.insert(path.to_path_buf(), MemNode::Symlink);
    }

    /// Make an entry unreadable: it can still be stat'ed, but opening a file
    /// or listing a directory fails with `PermissionDenied`.
    pub fn revoke_read(&self, path: impl AsRef<Path>) {
        self.lock_state()
            .unreadable
            .insert(path.as_ref().to_path_buf());
    }

    /// Lock an entry: a locked file cannot be moved, deleted or trashed, and
    /// nothing can be created inside a locked directory.
    pub fn lock(&self, path: impl AsRef<Path>) {
        self.lock_state().locked.insert(path.as_ref().to_path_buf());
    }

    /// Whether an entry exists.
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.lock_state().nodes.contains_key(path.as_ref())
    }

    /// Read a file's content.
    #[must_use]
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock_state().nodes.get(path.as_ref()) {
            Some(MemNode::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// All regular file paths, sorted.
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        self.lock_state()
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node, MemNode::File { .. }))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Paths that were sent to the trash, in order.
    #[must_use]
    pub fn trashed(&self) -> Vec<PathBuf> {
        self.lock_state().trashed.clone()
    }

    fn take_file(&self, path: &Path) -> io::Result<MemNode> {
        let mut state = self.lock_state();
        if state.locked.contains(path) {
            return Err(permission_denied(path));
        }
        match state.nodes.get(path) {
            Some(MemNode::File { .. }) => state.nodes.remove(path).ok_or_else(|| not_found(path)),
            Some(_) => Err(io::Error::other(format!(
                "not a regular file: {}",
                path.display()
            ))),
            None => Err(not_found(path)),
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn absolute(&self, path: &Path) -> io::Result<PathBuf> {
        // No process working directory here: relative paths start at `/`.
        Ok(normalize_lexically(&Path::new("/").join(path)))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.lock_state();
        match state.nodes.get(path) {
            Some(MemNode::Dir) => {}
            Some(_) => {
                return Err(io::Error::other(format!(
                    "not a directory: {}",
                    path.display()
                )))
            }
            None => return Err(not_found(path)),
        }
        if state.unreadable.contains(path) {
            return Err(permission_denied(path));
        }

        Ok(state
            .nodes
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }

    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        let state = self.lock_state();
        match state.nodes.get(path) {
            Some(MemNode::Dir) => Ok(EntryMetadata {
                kind: EntryKind::Dir,
                len: 0,
                modified: SystemTime::UNIX_EPOCH,
            }),
            Some(MemNode::File { data, modified }) => Ok(EntryMetadata {
                kind: EntryKind::File,
                len: data.len() as u64,
                modified: *modified,
            }),
            Some(MemNode::Symlink) => Ok(EntryMetadata {
                kind: EntryKind::Symlink,
                len: 0,
                modified: SystemTime::UNIX_EPOCH,
            }),
            None => Err(not_found(path)),
        }
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let state = self.lock_state();
        if state.unreadable.contains(path) {
            return Err(permission_denied(path));
        }
        match state.nodes.get(path) {
            Some(MemNode::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(_) => Err(io::Error::other(format!(
                "not a regular file: {}",
                path.display()
            ))),
            None => Err(not_found(path)),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        {
            let state = self.lock_state();
            if state.nodes.contains_key(to) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("destination exists: {}", to.display()),
                ));
            }
            match to.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    if !matches!(state.nodes.get(parent), Some(MemNode::Dir)) {
                        return Err(not_found(parent));
                    }
                    if state.locked.contains(parent) {
                        return Err(permission_denied(parent));
                    }
                }
                _ => {}
            }
        }

        let node = self.take_file(from)?;
        self.lock_state().nodes.insert(to.to_path_buf(), node);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.take_file(path).map(|_| ())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock_state();
        let mut missing = Vec::new();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            match state.nodes.get(ancestor) {
                Some(MemNode::Dir) => {
                    if !missing.is_empty() && state.locked.contains(ancestor) {
                        return Err(permission_denied(ancestor));
                    }
                    break;
                }
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("not a directory: {}", ancestor.display()),
                    ))
                }
                None => missing.push(ancestor.to_path_buf()),
            }
        }
        for dir in missing {
            state.nodes.insert(dir, MemNode::Dir);
        }
        Ok(())
    }

    fn trash(&self, path: &Path) -> io::Result<()> {
        self.take_file(path)?;
        self.lock_state().trashed.push(path.to_path_buf());
        Ok(())
    }
}

/// Source of wall-clock timestamps for session bookkeeping.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`Clock`] that always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
