//! Lazy, filtered directory traversal.
//!
//! # Overview
//!
//! [`PathWalker`] visits a scan root depth-first through a
//! [`FileSystem`], one directory listing at a time, and yields a
//! [`FileRecord`] for every regular file that passes the filters in
//! [`ScanConfig`]. Problems with individual paths are yielded as
//! [`ScanWarning`]s and never stop the walk.
//!
//! - Children are visited in sorted order, so output is deterministic
//! - Symbolic links are never followed
//! - Excluded prefixes, directory names and ignore patterns prune whole subtrees
//! - Size and extension filters apply to files only
//! - An optional shutdown flag stops iteration between entries

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use super::{FileRecord, ScanConfig, ScanWarning};
use crate::fs::{EntryKind, EntryMetadata, FileSystem};

/// Whether path comparisons ignore case on this platform.
const CASE_INSENSITIVE_PATHS: bool = cfg!(any(windows, target_os = "macos"));

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct PathWalker {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    config: ScanConfig,
    excluded_prefixes: Vec<PathBuf>,
    excluded_names: HashSet<String>,
    extensions: Option<HashSet<String>>,
    gitignore: Option<Gitignore>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl PathWalker {
    /// Create a walker for `root`.
    ///
    /// The root and excluded prefixes are made absolute first, so records
    /// carry absolute paths and prefixes match however the root was spelled.
    /// Invalid ignore patterns are logged and skipped.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, root: &Path, config: &ScanConfig) -> Self {
        let absolute = |path: &Path| {
            fs.absolute(path).unwrap_or_else(|e| {
                log::warn!("Cannot resolve {}: {}", path.display(), e);
                path.to_path_buf()
            })
        };
        let root = absolute(root);
        let excluded_prefixes = config
            .excluded_prefixes
            .iter()
            .map(|p| normalize_for_compare(&absolute(p)))
            .collect();
        let gitignore = build_gitignore(&root, &config.ignore_patterns);
        Self {
            fs,
            root,
            excluded_prefixes,
            excluded_names: config
                .excluded_dir_names
                .iter()
                .map(|n| normalize_name(n))
                .collect(),
            extensions: config.allowed_extensions(),
            gitignore,
            config: config.clone(),
            shutdown_flag: None,
        }
    }

    /// Set a shutdown flag checked before each entry.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Start walking. Nothing is read until the iterator is advanced.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            walker: self,
            pending_dirs: vec![self.root.clone()],
            ready: VecDeque::new(),
        }
    }

    fn is_excluded_prefix(&self, path: &Path) -> bool {
        if self.excluded_prefixes.is_empty() {
            return false;
        }
        let candidate = normalize_for_compare(path);
        self.excluded_prefixes
            .iter()
            .any(|prefix| candidate.starts_with(prefix))
    }

    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let Some(gitignore) = &self.gitignore else {
            return false;
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        gitignore.matched(relative, is_dir).is_ignore()
    }

    fn should_enter(&self, dir: &Path) -> bool {
        if self.is_excluded_prefix(dir) {
            log::trace!("Skipping excluded prefix: {}", dir.display());
            return false;
        }
        let excluded_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.excluded_names.contains(&normalize_name(n)));
        if excluded_name {
            log::trace!("Skipping excluded directory: {}", dir.display());
            return false;
        }
        if self.is_ignored(dir, true) {
            log::trace!("Ignoring directory: {}", dir.display());
            return false;
        }
        true
    }

    fn passes_extension_filter(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| allowed.contains(&ext.to_lowercase()))
    }

    fn accept_file(&self, path: PathBuf, metadata: EntryMetadata) -> Option<FileRecord> {
        let size = metadata.len;
        if size < self.config.min_size || size > self.config.max_size {
            log::trace!(
                "Skipping file due to size filter ({}): {}",
                size,
                path.display()
            );
            return None;
        }
        if self.is_excluded_prefix(&path) {
            log::trace!("Skipping excluded file: {}", path.display());
            return None;
        }
        if self.is_ignored(&path, false) {
            log::trace!("Ignoring file: {}", path.display());
            return None;
        }
        if !self.passes_extension_filter(&path) {
            log::trace!("Skipping file due to extension filter: {}", path.display());
            return None;
        }
        Some(FileRecord::new(path, size, metadata.modified))
    }

    /// Read one directory: files and warnings go to `ready`, subdirectories
    /// are returned in visiting order.
    fn expand(
        &self,
        dir: &Path,
        ready: &mut VecDeque<Result<(PathBuf, EntryMetadata), ScanWarning>>,
    ) -> Vec<PathBuf> {
        let mut children = match self.fs.read_dir(dir) {
            Ok(children) => children,
            Err(e) => {
                ready.push_back(Err(ScanWarning::from_io(dir, &e)));
                return Vec::new();
            }
        };
        children.sort();

        let mut subdirs = Vec::new();
        for child in children {
            match self.fs.metadata(&child) {
                Ok(meta) => match meta.kind {
                    EntryKind::Dir => {
                        if self.should_enter(&child) {
                            subdirs.push(child);
                        }
                    }
                    EntryKind::File => ready.push_back(Ok((child, meta))),
                    EntryKind::Symlink => log::trace!("Skipping symlink: {}", child.display()),
                    EntryKind::Other => {
                        log::trace!("Skipping special file: {}", child.display());
                    }
                },
                Err(e) => ready.push_back(Err(ScanWarning::from_io(&child, &e))),
            }
        }
        subdirs
    }
}

/// Iterator returned by [`PathWalker::walk`].
#[derive(Debug)]
pub struct Walk<'a> {
    walker: &'a PathWalker,
    pending_dirs: Vec<PathBuf>,
    ready: VecDeque<Result<(PathBuf, EntryMetadata), ScanWarning>>,
}

impl Iterator for Walk<'_> {
    type Item = Result<FileRecord, ScanWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.walker.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            if let Some(entry) = self.ready.pop_front() {
                match entry {
                    Ok((path, meta)) => {
                        if let Some(record) = self.walker.accept_file(path, meta) {
                            return Some(Ok(record));
                        }
                    }
                    Err(warning) => return Some(Err(warning)),
                }
                continue;
            }

            let dir = self.pending_dirs.pop()?;
            let subdirs = self.walker.expand(&dir, &mut self.ready);
            self.pending_dirs.extend(subdirs.into_iter().rev());
        }
    }
}

fn build_gitignore(root: &Path, patterns: &[String]) -> Option<Gitignore> {
    if patterns.is_empty() {
        return None;
    }

    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        if let Err(e) = builder.add_line(None, pattern) {
            log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
        }
    }

    match builder.build() {
        Ok(gitignore) => Some(gitignore),
        Err(e) => {
            log::warn!("Failed to build ignore patterns: {}", e);
            None
        }
    }
}

fn normalize_for_compare(path: &Path) -> PathBuf {
    if CASE_INSENSITIVE_PATHS {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path.to_path_buf()
    }
}

fn normalize_name(name: &str) -> String {
    if CASE_INSENSITIVE_PATHS {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}
