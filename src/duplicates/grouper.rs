//! Turns confirmed matches into numbered duplicate groups with a keeper.

use std::sync::Arc;

use super::groups::{DuplicateGroup, MatchGroup};
use super::keeper::{KeepRule, KeeperPolicy};

/// Running totals over all groups formed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupTotals {
    /// Number of duplicate groups
    pub groups: usize,
    /// Number of disposable copies across all groups
    pub duplicate_files: usize,
    /// Sum of reclaimable bytes across all groups
    pub reclaimable_bytes: u64,
}

/// Forms [`DuplicateGroup`]s as hash buckets resolve.
///
/// Buckets can resolve in any order, so [`DuplicateGrouper::into_groups`]
/// sorts the result (largest savings first) and numbers it from 1.
#[derive(Debug)]
pub struct DuplicateGrouper {
    policy: Arc<dyn KeeperPolicy>,
    groups: Vec<DuplicateGroup>,
    totals: GroupTotals,
}

impl DuplicateGrouper {
    /// Create a grouper using `policy` to pick keepers.
    #[must_use]
    pub fn new(policy: Arc<dyn KeeperPolicy>) -> Self {
        Self {
            policy,
            groups: Vec::new(),
            totals: GroupTotals::default(),
        }
    }

    /// Add a confirmed match. Matches with fewer than two files are ignored.
    ///
    /// A keeper index outside the match falls back to [`KeepRule::default`],
    /// so every group keeps exactly one file whatever the policy returns.
    pub fn add(&mut self, matched: MatchGroup) -> Option<&DuplicateGroup> {
        if matched.records.len() < 2 {
            return None;
        }

        let mut keeper = self.policy.select_keeper(&matched.records);
        if keeper >= matched.records.len() {
            log::error!(
                "Keeper policy {:?} chose member {} of {}; using {} instead",
                self.policy,
                keeper,
                matched.records.len(),
                KeepRule::default()
            );
            keeper = KeepRule::default().select_keeper(&matched.records);
        }
        let group = DuplicateGroup::new(0, matched, keeper)?;

        self.totals.groups += 1;
        self.totals.duplicate_files += group.duplicate_count();
        self.totals.reclaimable_bytes += group.reclaimable_bytes();
        log::debug!(
            "Duplicate group: {} files of {} bytes ({})",
            group.len(),
            group.size,
            group.digest_hex()
        );

        self.groups.push(group);
        self.groups.last()
    }

    /// Totals over all groups added so far.
    #[must_use]
    pub fn totals(&self) -> GroupTotals {
        self.totals
    }

    /// Finish grouping: sort by reclaimable bytes (descending), then by
    /// keeper path, and assign ids.
    #[must_use]
    pub fn into_groups(mut self) -> Vec<DuplicateGroup> {
        self.groups.sort_by(|a, b| {
            b.reclaimable_bytes()
                .cmp(&a.reclaimable_bytes())
                .then_with(|| a.keeper().map(|k| &k.path).cmp(&b.keeper().map(|k| &k.path)))
        });
        for (i, group) in self.groups.iter_mut().enumerate() {
            group.id = i + 1;
        }
        self.groups
    }
}
