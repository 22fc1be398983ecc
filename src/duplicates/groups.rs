//! Size buckets and confirmed duplicate groups.
//!
//! # Overview
//!
//! Size bucketing is the first filter: files of different sizes cannot be
//! duplicates, so only sizes shared by two or more files move on to hashing.
//! Buckets come out in ascending size order, and each bucket keeps its
//! files in discovery order.
//!
//! # Example
//!
//! ```
//! use dupsweep::scanner::FileRecord;
//! use dupsweep::duplicates::bucket_by_size;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileRecord::new("/a.txt", 100, SystemTime::UNIX_EPOCH),
//!     FileRecord::new("/b.txt", 100, SystemTime::UNIX_EPOCH),
//!     FileRecord::new("/c.txt", 200, SystemTime::UNIX_EPOCH),
//! ];
//!
//! let (buckets, stats) = bucket_by_size(files);
//!
//! assert_eq!(buckets.len(), 1);
//! assert_eq!(buckets[0].size, 100);
//! assert_eq!(stats.eliminated_unique, 1);
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::scanner::{hash_to_hex, Checksum, Digest, FileRecord};

/// Files sharing one exact size. Always holds at least two records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeBucket {
    /// Shared file size in bytes
    pub size: u64,
    /// Files with this size, in discovery order
    pub records: Vec<FileRecord>,
}

impl SizeBucket {
    /// Number of files in the bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes that must be read to checksum every file in the bucket.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.size * self.records.len() as u64
    }
}

/// Statistics from the size bucketing phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Total number of files processed
    pub total_files: usize,
    /// Total size of all files in bytes
    pub total_bytes: u64,
    /// Number of distinct sizes seen
    pub unique_sizes: usize,
    /// Files dropped because no other file shares their size
    pub eliminated_unique: usize,
    /// Files that go on to hashing
    pub candidate_files: usize,
    /// Number of buckets produced
    pub buckets: usize,
}

impl BucketStats {
    /// Percentage of files eliminated by size.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Incremental size bucketer, fed as files are discovered.
#[derive(Debug, Default)]
pub struct SizeBucketer {
    by_size: BTreeMap<u64, Vec<FileRecord>>,
    total_files: usize,
    total_bytes: u64,
}

impl SizeBucketer {
    /// Create an empty bucketer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one discovered file.
    pub fn push(&mut self, record: FileRecord) {
        self.total_files += 1;
        self.total_bytes += record.size;
        self.by_size.entry(record.size).or_default().push(record);
    }

    /// Drop singleton sizes and return the remaining buckets, ascending by size.
    #[must_use]
    pub fn finish(self) -> (Vec<SizeBucket>, BucketStats) {
        let mut stats = BucketStats {
            total_files: self.total_files,
            total_bytes: self.total_bytes,
            unique_sizes: self.by_size.len(),
            ..BucketStats::default()
        };

        let mut buckets = Vec::new();
        for (size, records) in self.by_size {
            if records.len() < 2 {
                stats.eliminated_unique += records.len();
                log::trace!("Eliminated unique size {}", size);
                continue;
            }
            log::debug!(
                "Size bucket {} bytes: {} candidates",
                size,
                records.len()
            );
            stats.candidate_files += records.len();
            buckets.push(SizeBucket { size, records });
        }
        stats.buckets = buckets.len();

        log::info!(
            "Phase 1 complete: {} files → {} candidates in {} buckets ({:.1}% eliminated)",
            stats.total_files,
            stats.candidate_files,
            stats.buckets,
            stats.elimination_rate()
        );

        (buckets, stats)
    }
}

/// Partition files by exact size, keeping only sizes shared by two or more.
#[must_use]
pub fn bucket_by_size(
    records: impl IntoIterator<Item = FileRecord>,
) -> (Vec<SizeBucket>, BucketStats) {
    let mut bucketer = SizeBucketer::new();
    for record in records {
        bucketer.push(record);
    }
    bucketer.finish()
}

/// Files with identical size, checksum and digest, before a keeper is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchGroup {
    /// Shared size
    pub size: u64,
    /// Shared checksum
    pub checksum: Checksum,
    /// Shared digest
    pub digest: Digest,
    /// Members in discovery order
    pub records: Vec<FileRecord>,
}

/// Where a disposable file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionStatus {
    /// Not yet acted on
    Pending,
    /// Moved to `destination`
    Moved {
        /// Final path
        destination: PathBuf,
    },
    /// Removed, either to the trash or permanently
    Deleted {
        /// Whether it went to the recycle bin
        trashed: bool,
    },
    /// The action failed and the file is untouched
    Failed {
        /// Failure description
        reason: String,
    },
}

/// Role of a file within its group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRole {
    /// The retained copy. Never moved or deleted.
    Keeper,
    /// A redundant copy and its disposition progress.
    Disposable(DispositionStatus),
}

/// One file in a duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    /// The file
    pub record: FileRecord,
    /// Keeper or disposable
    pub role: MemberRole,
}

impl GroupMember {
    /// Whether this member is the keeper.
    #[must_use]
    pub fn is_keeper(&self) -> bool {
        self.role == MemberRole::Keeper
    }
}

/// A confirmed set of byte-identical files with exactly one keeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Group number, 1-based, stable for the session
    pub id: usize,
    /// Shared size
    pub size: u64,
    /// Shared checksum
    pub checksum: Checksum,
    /// Shared digest
    pub digest: Digest,
    /// All members, in discovery order
    pub members: Vec<GroupMember>,
}

impl DuplicateGroup {
    /// Build a group from a match, marking `keeper` as the retained copy.
    ///
    /// Returns `None` when the match has fewer than two files or `keeper`
    /// does not index one of them.
    #[must_use]
    pub fn new(id: usize, matched: MatchGroup, keeper: usize) -> Option<Self> {
        if matched.records.len() < 2 || keeper >= matched.records.len() {
            return None;
        }
        let members = matched
            .records
            .into_iter()
            .enumerate()
            .map(|(i, record)| GroupMember {
                record,
                role: if i == keeper {
                    MemberRole::Keeper
                } else {
                    MemberRole::Disposable(DispositionStatus::Pending)
                },
            })
            .collect();

        Some(Self {
            id,
            size: matched.size,
            checksum: matched.checksum,
            digest: matched.digest,
            members,
        })
    }

    /// Number of files in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The retained file.
    #[must_use]
    pub fn keeper(&self) -> Option<&FileRecord> {
        self.members
            .iter()
            .find(|m| m.is_keeper())
            .map(|m| &m.record)
    }

    /// The redundant copies.
    pub fn disposables(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|m| !m.is_keeper())
    }

    /// Number of redundant copies.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.members.len().saturating_sub(1)
    }

    /// Bytes freed by removing every disposable copy.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Digest as lowercase hex.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hash_to_hex(&self.digest)
    }

    /// All member paths.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.members.iter().map(|m| m.record.path.clone()).collect()
    }
}
