//! File discovery and content fingerprinting.
//!
//! - [`walker`]: lazy, filtered traversal of a scan root
//! - [`hasher`]: CRC32 checksums and confirmation digests (streaming)
//!
//! # Example
//!
//! ```
//! use dupsweep::fs::{FileSystem, MemoryFileSystem};
//! use dupsweep::scanner::{PathWalker, ScanConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! fs.add_file("/photos/a.jpg", b"jpeg bytes", SystemTime::UNIX_EPOCH);
//!
//! let fs: Arc<dyn FileSystem> = fs;
//! let walker = PathWalker::new(fs, Path::new("/photos"), &ScanConfig::default());
//! let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! assert_eq!(files.len(), 1);
//! ```

pub mod hasher;
pub mod walker;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub use hasher::{
    checksum_reader, digest_reader, fingerprint, hash_to_hex, Checksum, Digest, DigestAlgorithm,
    Fingerprint, CHUNK_SIZE,
};
pub use walker::{PathWalker, Walk};

/// Default upper size bound: 2000 MiB.
pub const DEFAULT_MAX_SIZE: u64 = 2000 * 1024 * 1024;

/// A discovered regular file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }
}

/// Groups of file extensions a scan can be limited to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// Photos and raster images
    Image,
    /// Video containers
    Video,
    /// Office and text documents
    Document,
    /// Archives, audio and disk images (configurable)
    Other,
}

impl FileCategory {
    /// Built-in extensions for this category. `Other` has none built in;
    /// its list comes from [`ScanConfig::other_extensions`].
    #[must_use]
    pub fn builtin_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image => &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "gif"],
            Self::Video => &["mp4", "mov", "avi", "mkv", "wmv", "flv", "webm"],
            Self::Document => &["pdf", "doc", "docx", "txt", "rtf", "odt"],
            Self::Other => &[],
        }
    }
}

/// Filters applied while discovering files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Categories to include. Empty means every extension is accepted.
    pub categories: Vec<FileCategory>,
    /// Extensions belonging to [`FileCategory::Other`].
    pub other_extensions: Vec<String>,
    /// Extensions accepted in addition to the selected categories.
    pub extra_extensions: Vec<String>,
    /// Minimum file size in bytes (inclusive).
    pub min_size: u64,
    /// Maximum file size in bytes (inclusive).
    pub max_size: u64,
    /// Path prefixes that are never entered or reported.
    pub excluded_prefixes: Vec<PathBuf>,
    /// Directory names skipped wherever they appear.
    pub excluded_dir_names: Vec<String>,
    /// Gitignore-style patterns, relative to the scan root.
    pub ignore_patterns: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            categories: vec![
                FileCategory::Image,
                FileCategory::Video,
                FileCategory::Document,
            ],
            other_extensions: ["zip", "rar", "7z", "tar", "gz", "mp3", "wav", "flac", "iso"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            extra_extensions: Vec::new(),
            min_size: 1,
            max_size: DEFAULT_MAX_SIZE,
            excluded_prefixes: Vec::new(),
            excluded_dir_names: [
                "Windows",
                "Program Files",
                "ProgramData",
                "AppData",
                "$Recycle.Bin",
                "System Volume Information",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            ignore_patterns: Vec::new(),
        }
    }
}

impl ScanConfig {
    /// A configuration that accepts every extension and size from 1 byte.
    #[must_use]
    pub fn all_files() -> Self {
        Self {
            categories: Vec::new(),
            ..Self::default()
        }
    }

    /// Set the included categories.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<FileCategory>) -> Self {
        self.categories = categories;
        self
    }

    /// Set the inclusive size bounds.
    #[must_use]
    pub fn with_size_bounds(mut self, min_size: u64, max_size: u64) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Add an excluded path prefix.
    #[must_use]
    pub fn with_excluded_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }

    /// Set the excluded directory names.
    #[must_use]
    pub fn with_excluded_dir_names(mut self, names: Vec<String>) -> Self {
        self.excluded_dir_names = names;
        self
    }

    /// Set gitignore-style patterns.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Add extensions accepted regardless of category.
    #[must_use]
    pub fn with_extra_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extra_extensions = extensions;
        self
    }

    /// Check the configuration for contradictions.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FatalConfig`] if `min_size` exceeds `max_size`.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.min_size > self.max_size {
            return Err(EngineError::FatalConfig(format!(
                "min_size ({}) is greater than max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }

    /// Lowercased extensions accepted by this configuration, or `None` if
    /// no extension filtering applies.
    #[must_use]
    pub fn allowed_extensions(&self) -> Option<HashSet<String>> {
        if self.categories.is_empty() {
            return None;
        }

        let mut allowed = HashSet::new();
        for category in &self.categories {
            if *category == FileCategory::Other {
                allowed.extend(self.other_extensions.iter().map(|e| normalize_extension(e)));
            } else {
                allowed.extend(category.builtin_extensions().iter().map(|e| (*e).to_string()));
            }
        }
        allowed.extend(self.extra_extensions.iter().map(|e| normalize_extension(e)));
        Some(allowed)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// A non-fatal problem with a single path. The scan continues.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    /// Permission was denied when reading a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path vanished between discovery and use.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The file's length changed while it was being hashed.
    #[error("File changed during hashing: {path} (expected {expected} bytes, read {actual})")]
    SizeChanged {
        /// File path
        path: PathBuf,
        /// Size recorded at discovery
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// Any other I/O failure.
    #[error("I/O error for {path}: {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error description
        message: String,
    },
}

impl ScanWarning {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                Self::PermissionDenied(path.to_path_buf())
            }
            io::ErrorKind::NotFound => {
                log::debug!("Path not found (may have been deleted): {}", path.display());
                Self::NotFound(path.to_path_buf())
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                Self::Io {
                    path: path.to_path_buf(),
                    message: error.to_string(),
                }
            }
        }
    }

    /// The path the warning is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(path) | Self::NotFound(path) => path,
            Self::SizeChanged { path, .. } | Self::Io { path, .. } => path,
        }
    }
}
