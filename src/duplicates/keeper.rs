//! Keeper selection: which copy in a duplicate group is retained.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::scanner::FileRecord;

/// Chooses the retained copy of a duplicate group.
pub trait KeeperPolicy: Send + Sync + std::fmt::Debug {
    /// Index into `members` of the file to keep. `members` is never empty.
    fn select_keeper(&self, members: &[FileRecord]) -> usize;
}

/// Built-in keeper rules.
///
/// Ties are broken by the shorter path string, then by path order, so the
/// choice never depends on discovery order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum KeepRule {
    /// Keep the file with the oldest modification time
    #[default]
    OldestModified,
    /// Keep the file with the newest modification time
    NewestModified,
    /// Keep the file with the fewest path components
    Shallowest,
}

fn tie_break(a: &FileRecord, b: &FileRecord) -> Ordering {
    a.path
        .as_os_str()
        .len()
        .cmp(&b.path.as_os_str().len())
        .then_with(|| a.path.cmp(&b.path))
}

impl KeepRule {
    fn compare(self, a: &FileRecord, b: &FileRecord) -> Ordering {
        match self {
            Self::OldestModified => a.modified.cmp(&b.modified),
            Self::NewestModified => b.modified.cmp(&a.modified),
            Self::Shallowest => a
                .path
                .components()
                .count()
                .cmp(&b.path.components().count())
                .then_with(|| a.modified.cmp(&b.modified)),
        }
        .then_with(|| tie_break(a, b))
    }
}

impl KeeperPolicy for KeepRule {
    fn select_keeper(&self, members: &[FileRecord]) -> usize {
        members
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| self.compare(a, b))
            .map_or(0, |(i, _)| i)
    }
}

impl std::fmt::Display for KeepRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OldestModified => write!(f, "oldest-modified"),
            Self::NewestModified => write!(f, "newest-modified"),
            Self::Shallowest => write!(f, "shallowest"),
        }
    }
}
