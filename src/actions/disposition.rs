//! Moving or deleting the redundant copies of each duplicate group.
//!
//! # Overview
//!
//! [`DispositionExecutor`] acts on every disposable member of every
//! [`DuplicateGroup`]; keepers are never touched. Each file is handled on
//! its own: a failure is recorded and the batch moves on.
//!
//! - Moves either mirror the file's path relative to the scan root under
//!   the destination, or flatten everything into the destination directory
//! - A taken destination name gets a numeric suffix (`photo_1.jpg`); an
//!   existing file is never overwritten
//! - Deletes go to the platform trash or are permanent
//! - Before acting, the file is re-checked against its scan-time size and
//!   modification time
//! - A shutdown flag is honored between files

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duplicates::{DispositionStatus, DuplicateGroup, MemberRole};
use crate::fs::FileSystem;
use crate::scanner::FileRecord;

/// Give up on finding a free destination name after this many suffixes.
pub const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Error type for a single file's disposition.
#[derive(Debug, Error)]
pub enum DispositionError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when moving or deleting.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// File was modified since the scan.
    #[error("file modified since scan: {0}")]
    Modified(PathBuf),

    /// The destination directory could not be created or written.
    #[error("destination not writable: {path}: {message}")]
    DestinationUnwritable {
        /// Destination directory
        path: PathBuf,
        /// Error description
        message: String,
    },

    /// No free destination name was found.
    #[error("no free destination name for {0}")]
    CollisionUnresolved(PathBuf),

    /// Trash operation failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed {
        /// File path
        path: PathBuf,
        /// Error description
        message: String,
    },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl DispositionError {
    fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// The path the error is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::Modified(p)
            | Self::CollisionUnresolved(p)
            | Self::DestinationUnwritable { path: p, .. }
            | Self::TrashFailed { path: p, .. }
            | Self::Io { path: p, .. } => p,
        }
    }
}

/// What to do with disposable copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispositionAction {
    /// Move them under this directory
    MoveTo(PathBuf),
    /// Delete them (trash or permanent, per [`DispositionOptions`])
    Delete,
}

/// How deletes are carried out.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Move to the platform recycle bin
    #[default]
    Trash,
    /// Remove permanently
    Permanent,
}

/// Where moved files land inside the destination.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MoveLayout {
    /// Recreate the path relative to the scan root
    #[default]
    Mirror,
    /// Put every file directly in the destination
    Flat,
}

/// Disposition configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispositionOptions {
    /// Trash or permanent delete
    pub delete_mode: DeleteMode,
    /// Mirror or flat moves
    pub layout: MoveLayout,
    /// Re-check size and modification time before acting
    pub verify_before_dispose: bool,
}

impl Default for DispositionOptions {
    fn default() -> Self {
        Self {
            delete_mode: DeleteMode::Trash,
            layout: MoveLayout::Mirror,
            verify_before_dispose: true,
        }
    }
}

impl DispositionOptions {
    /// Set the delete mode.
    #[must_use]
    pub fn with_delete_mode(mut self, mode: DeleteMode) -> Self {
        self.delete_mode = mode;
        self
    }

    /// Set the move layout.
    #[must_use]
    pub fn with_layout(mut self, layout: MoveLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Enable/disable pre-disposition verification.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify_before_dispose = verify;
        self
    }
}

/// Result for one disposable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DispositionOutcome {
    /// Moved to `destination`
    Moved {
        /// Final path
        destination: PathBuf,
    },
    /// Deleted
    Deleted {
        /// Whether it went to the recycle bin
        trashed: bool,
    },
    /// Left in place
    Failed {
        /// Failure description
        reason: String,
    },
}

impl DispositionOutcome {
    /// Whether the file was removed from its original location.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

impl From<&DispositionOutcome> for DispositionStatus {
    fn from(outcome: &DispositionOutcome) -> Self {
        match outcome {
            DispositionOutcome::Moved { destination } => Self::Moved {
                destination: destination.clone(),
            },
            DispositionOutcome::Deleted { trashed } => Self::Deleted { trashed: *trashed },
            DispositionOutcome::Failed { reason } => Self::Failed {
                reason: reason.clone(),
            },
        }
    }
}

/// One line of the disposition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispositionRecord {
    /// Group the file belongs to
    pub group_id: usize,
    /// Original path
    pub path: PathBuf,
    /// File size
    pub size: u64,
    /// What happened
    #[serde(flatten)]
    pub outcome: DispositionOutcome,
}

/// A file that could not be disposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispositionFailure {
    /// Original path
    pub path: PathBuf,
    /// Failure description
    pub reason: String,
}

/// Totals for a disposition run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispositionSummary {
    /// Files moved or deleted
    pub files_removed: usize,
    /// Sum of the sizes of those files
    pub bytes_reclaimed: u64,
    /// Files left in place, with reasons
    pub failures: Vec<DispositionFailure>,
    /// Every file acted on, in order
    pub records: Vec<DispositionRecord>,
    /// Whether cancellation stopped the run early
    pub interrupted: bool,
}

impl DispositionSummary {
    /// Check if every attempted file was disposed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        let freed = bytesize::ByteSize::b(self.bytes_reclaimed);
        let mut text = if self.all_succeeded() {
            format!("Disposed {} file(s), reclaimed {}", self.files_removed, freed)
        } else {
            format!(
                "Disposed {} file(s), {} failed, reclaimed {}",
                self.files_removed,
                self.failures.len(),
                freed
            )
        };
        if self.interrupted {
            text.push_str(" (interrupted)");
        }
        text
    }
}

/// Acts on the disposable members of duplicate groups.
#[derive(Debug)]
pub struct DispositionExecutor<'a> {
    fs: &'a dyn FileSystem,
    options: DispositionOptions,
}

impl<'a> DispositionExecutor<'a> {
    /// Create an executor.
    #[must_use]
    pub fn new(fs: &'a dyn FileSystem, options: DispositionOptions) -> Self {
        Self { fs, options }
    }

    /// Apply `action` to every pending disposable copy in `groups`.
    ///
    /// Member statuses in `groups` are updated in place. `on_record` is
    /// called after each file. The run stops between files once `shutdown`
    /// is set; files not reached stay `Pending`.
    pub fn execute<F>(
        &self,
        groups: &mut [DuplicateGroup],
        action: &DispositionAction,
        scan_root: &Path,
        shutdown: Option<&AtomicBool>,
        mut on_record: F,
    ) -> DispositionSummary
    where
        F: FnMut(&DispositionRecord),
    {
        let mut summary = DispositionSummary::default();
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        'groups: for group in groups.iter_mut() {
            let group_id = group.id;
            for member in &mut group.members {
                if !matches!(member.role, MemberRole::Disposable(DispositionStatus::Pending)) {
                    continue;
                }
                if shutdown.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                    log::info!("Disposition interrupted by shutdown request");
                    summary.interrupted = true;
                    break 'groups;
                }

                let outcome = match self.dispose_one(&member.record, action, scan_root, &mut claimed)
                {
                    Ok(outcome) => {
                        summary.files_removed += 1;
                        summary.bytes_reclaimed += member.record.size;
                        outcome
                    }
                    Err(e) => {
                        log::warn!("Failed to dispose {}: {}", member.record.path.display(), e);
                        summary.failures.push(DispositionFailure {
                            path: member.record.path.clone(),
                            reason: e.to_string(),
                        });
                        DispositionOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                };

                member.role = MemberRole::Disposable(DispositionStatus::from(&outcome));
                let record = DispositionRecord {
                    group_id,
                    path: member.record.path.clone(),
                    size: member.record.size,
                    outcome,
                };
                on_record(&record);
                summary.records.push(record);
            }
        }

        log::info!("{}", summary.summary());
        summary
    }

    fn dispose_one(
        &self,
        record: &FileRecord,
        action: &DispositionAction,
        scan_root: &Path,
        claimed: &mut HashSet<PathBuf>,
    ) -> Result<DispositionOutcome, DispositionError> {
        if self.options.verify_before_dispose {
            self.verify_unchanged(record)?;
        }

        match action {
            DispositionAction::MoveTo(dest_root) => {
                let wanted = self.destination_for(&record.path, dest_root, scan_root);
                let destination = self.free_destination(&wanted, claimed)?;
                if let Some(parent) = destination.parent() {
                    self.fs.create_dir_all(parent).map_err(|e| {
                        DispositionError::DestinationUnwritable {
                            path: parent.to_path_buf(),
                            message: e.to_string(),
                        }
                    })?;
                }
                self.fs
                    .rename(&record.path, &destination)
                    .map_err(|e| DispositionError::from_io(&record.path, e))?;
                log::debug!(
                    "Moved {} -> {}",
                    record.path.display(),
                    destination.display()
                );
                claimed.insert(destination.clone());
                Ok(DispositionOutcome::Moved { destination })
            }
            DispositionAction::Delete => match self.options.delete_mode {
                DeleteMode::Trash => {
                    self.fs.trash(&record.path).map_err(|e| match e.kind() {
                        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                            DispositionError::from_io(&record.path, e)
                        }
                        _ => DispositionError::TrashFailed {
                            path: record.path.clone(),
                            message: e.to_string(),
                        },
                    })?;
                    log::debug!("Moved to trash: {}", record.path.display());
                    Ok(DispositionOutcome::Deleted { trashed: true })
                }
                DeleteMode::Permanent => {
                    self.fs
                        .remove_file(&record.path)
                        .map_err(|e| DispositionError::from_io(&record.path, e))?;
                    log::debug!("Permanently deleted: {}", record.path.display());
                    Ok(DispositionOutcome::Deleted { trashed: false })
                }
            },
        }
    }

    /// Check the file still matches what the scan saw.
    fn verify_unchanged(&self, record: &FileRecord) -> Result<(), DispositionError> {
        let current = self
            .fs
            .metadata(&record.path)
            .map_err(|e| DispositionError::from_io(&record.path, e))?;

        if !current.is_file() {
            return Err(DispositionError::NotFound(record.path.clone()));
        }
        if current.len != record.size || current.modified != record.modified {
            log::warn!(
                "File modified since scan: {} (size {} -> {})",
                record.path.display(),
                record.size,
                current.len
            );
            return Err(DispositionError::Modified(record.path.clone()));
        }
        Ok(())
    }

    fn destination_for(&self, path: &Path, dest_root: &Path, scan_root: &Path) -> PathBuf {
        let file_name = path.file_name().map(PathBuf::from).unwrap_or_default();
        match self.options.layout {
            MoveLayout::Flat => dest_root.join(file_name),
            MoveLayout::Mirror => match path.strip_prefix(scan_root) {
                Ok(relative) if !relative.as_os_str().is_empty() => dest_root.join(relative),
                _ => dest_root.join(file_name),
            },
        }
    }

    /// First free name among `wanted`, `stem_1.ext`, `stem_2.ext`, ...
    fn free_destination(
        &self,
        wanted: &Path,
        claimed: &HashSet<PathBuf>,
    ) -> Result<PathBuf, DispositionError> {
        let is_free = |candidate: &Path| !claimed.contains(candidate) && !self.fs.exists(candidate);
        if is_free(wanted) {
            return Ok(wanted.to_path_buf());
        }

        let stem = wanted
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = wanted
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        for n in 1..=MAX_COLLISION_SUFFIX {
            let candidate = wanted.with_file_name(format!("{stem}_{n}{ext}"));
            if is_free(&candidate) {
                return Ok(candidate);
            }
        }
        Err(DispositionError::CollisionUnresolved(wanted.to_path_buf()))
    }
}
