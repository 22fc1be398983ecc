//! Data structures for a scan session.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::actions::{DispositionAction, DispositionSummary};
use crate::duplicates::DuplicateGroup;
use crate::scanner::{ScanConfig, ScanWarning};

/// Lifecycle of a scan session.
///
/// ```text
/// Idle -> Scanning -> Hashing -> Grouped -> Disposing -> Done
///            \           \          \           \
///             +-----------+----------+-----------+--> Cancelled | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// No scan started
    Idle,
    /// Walking the scan root
    Scanning,
    /// Checksumming and digesting size buckets
    Hashing,
    /// Groups are ready and await a disposition decision
    Grouped,
    /// Moving or deleting redundant copies
    Disposing,
    /// Disposition finished
    Done,
    /// Stopped by a cancellation request
    Cancelled,
    /// Stopped by an unrecoverable error
    Failed,
}

impl ScanState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }

    /// Whether work is in progress in this state.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Scanning | Self::Hashing | Self::Disposing)
    }

    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ScanState::*;
        match (self, next) {
            (Idle, Scanning) | (Scanning, Hashing) | (Hashing, Grouped) => true,
            (Grouped, Disposing) | (Disposing, Done) => true,
            (Scanning | Hashing | Grouped | Disposing, Cancelled) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Hashing => "hashing",
            Self::Grouped => "grouped",
            Self::Disposing => "disposing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Monotonic progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Files accepted by the walker
    pub files_scanned: u64,
    /// Bytes in those files
    pub bytes_scanned: u64,
    /// Files through a hashing stage (a file digested too counts twice)
    pub files_hashed: u64,
    /// Bytes read by hashing
    pub bytes_hashed: u64,
    /// Disposable copies across all groups, set when hashing finishes
    pub duplicates_found: u64,
    /// Bytes those copies occupy
    pub bytes_reclaimable: u64,
    /// Paths that produced warnings
    pub warnings: u64,
}

/// Everything known about the current scan.
#[derive(Debug)]
pub struct ScanSession {
    pub(crate) id: u64,
    pub(crate) root: PathBuf,
    pub(crate) config: ScanConfig,
    pub(crate) state: ScanState,
    pub(crate) counters: SessionCounters,
    pub(crate) groups: Vec<DuplicateGroup>,
    pub(crate) warnings: Vec<ScanWarning>,
    pub(crate) cancel_flag: Arc<AtomicBool>,
    pub(crate) action: Option<DispositionAction>,
    pub(crate) disposition: Option<DispositionSummary>,
    pub(crate) failure: Option<String>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
}

impl ScanSession {
    /// Placeholder session before any scan starts.
    pub(crate) fn idle() -> Self {
        Self::new(0, PathBuf::new(), ScanConfig::default(), None)
    }

    pub(crate) fn new(
        id: u64,
        root: PathBuf,
        config: ScanConfig,
        started_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            root,
            config,
            state: ScanState::Idle,
            counters: SessionCounters::default(),
            groups: Vec::new(),
            warnings: Vec::new(),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            action: None,
            disposition: None,
            failure: None,
            started_at,
            finished_at: None,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Scan root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filters the scan runs with.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Progress counters.
    #[must_use]
    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    /// Duplicate groups found so far. Complete once the session is `Grouped`;
    /// partial after a cancellation.
    #[must_use]
    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    /// Non-fatal problems encountered.
    #[must_use]
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Sum of reclaimable bytes over all groups.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::reclaimable_bytes).sum()
    }

    /// The action confirmed for this session, if any.
    #[must_use]
    pub fn action(&self) -> Option<&DispositionAction> {
        self.action.as_ref()
    }

    /// Disposition results, once disposition has run.
    #[must_use]
    pub fn disposition(&self) -> Option<&DispositionSummary> {
        self.disposition.as_ref()
    }

    /// Why the session failed.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// When the scan started.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the session reached a terminal state.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}
