//! The scan controller: one session, driven through its state machine.
//!
//! # Overview
//!
//! [`ScanController`] owns the current [`ScanSession`] and runs every stage
//! on the calling thread, except hashing, which fans out to the worker pool
//! in [`HashPipeline`]. Progress and results are published as
//! [`EngineEvent`]s.
//!
//! Disposition never starts on its own. After hashing, the session parks in
//! [`ScanState::Grouped`] until [`ScanController::confirm_disposition`] is
//! called with the same handle.
//!
//! # Example
//!
//! ```
//! use dupsweep::fs::{MemoryFileSystem, SystemClock};
//! use dupsweep::scanner::ScanConfig;
//! use dupsweep::session::{EngineOptions, EventSender, ScanController, ScanState};
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! fs.add_file("/data/a.txt", b"same", SystemTime::UNIX_EPOCH);
//! fs.add_file("/data/b.txt", b"same", SystemTime::UNIX_EPOCH);
//!
//! let mut controller = ScanController::new(
//!     fs,
//!     Arc::new(SystemClock),
//!     EventSender::discard(),
//!     EngineOptions::default(),
//! );
//! let _handle = controller
//!     .start_scan(Path::new("/data"), ScanConfig::all_files())
//!     .unwrap();
//! assert_eq!(controller.process().unwrap(), ScanState::Grouped);
//! assert_eq!(controller.session().groups().len(), 1);
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::data::{ScanSession, ScanState};
use super::events::{EngineEvent, EventSender};
use crate::actions::{
    DispositionAction, DispositionExecutor, DispositionOptions, DispositionSummary,
};
use crate::duplicates::{
    default_io_threads, DuplicateGrouper, HashPipeline, KeepRule, KeeperPolicy, PipelineConfig,
    PipelineEvent, SizeBucket, SizeBucketer,
};
use crate::error::EngineError;
use crate::fs::{Clock, FileSystem};
use crate::scanner::{DigestAlgorithm, PathWalker, ScanConfig, ScanWarning};

/// Engine-wide settings that outlive a single scan.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Hashing worker threads
    pub io_threads: usize,
    /// Confirmation digest algorithm
    pub digest: DigestAlgorithm,
    /// Keeper selection policy
    pub keeper: Arc<dyn KeeperPolicy>,
    /// How dispositions are carried out
    pub disposition: DispositionOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            io_threads: default_io_threads(),
            digest: DigestAlgorithm::default(),
            keeper: Arc::new(KeepRule::default()),
            disposition: DispositionOptions::default(),
        }
    }
}

impl EngineOptions {
    /// Set the worker count.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Set the keeper policy.
    #[must_use]
    pub fn with_keeper(mut self, keeper: Arc<dyn KeeperPolicy>) -> Self {
        self.keeper = keeper;
        self
    }

    /// Set the disposition options.
    #[must_use]
    pub fn with_disposition(mut self, disposition: DispositionOptions) -> Self {
        self.disposition = disposition;
        self
    }
}

/// Identifies a session and carries its cancellation flag.
///
/// Cloneable and `Send`, so another thread (a Ctrl+C handler, say) can
/// request cancellation while [`ScanController::process`] is running.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    cancel: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation. Takes effect at the next file boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// The shared flag, for wiring into signal handlers.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

/// Drives scan sessions.
#[derive(Debug)]
pub struct ScanController {
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    events: EventSender,
    options: EngineOptions,
    session: ScanSession,
    next_id: u64,
}

impl ScanController {
    /// Create a controller. Nothing runs until [`start_scan`](Self::start_scan).
    #[must_use]
    pub fn new(
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
        events: EventSender,
        options: EngineOptions,
    ) -> Self {
        Self {
            fs,
            clock,
            events,
            options,
            session: ScanSession::idle(),
            next_id: 1,
        }
    }

    /// Current state of the session.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.session.state
    }

    /// The current session.
    #[must_use]
    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Consume the controller, closing its event queue.
    #[must_use]
    pub fn into_session(self) -> ScanSession {
        self.session
    }

    /// Begin a new session over `root`, replacing any finished or parked one.
    ///
    /// The session enters `Scanning`; call [`process`](Self::process) to run it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidState`] if a session is mid-stage
    /// - [`EngineError::FatalConfig`] if `config` is contradictory
    /// - [`EngineError::InvalidRoot`] if `root` is not a readable directory
    ///
    /// In the last two cases the new session is left in `Failed`. A relative
    /// `root` is made absolute first; the session records the absolute path.
    pub fn start_scan(
        &mut self,
        root: &Path,
        config: ScanConfig,
    ) -> Result<SessionHandle, EngineError> {
        if self.session.state.is_running() {
            return Err(EngineError::InvalidState {
                operation: "start a scan",
                state: self.session.state,
            });
        }

        let (root, resolved) = match self.fs.absolute(root) {
            Ok(absolute) => (absolute, Ok(())),
            Err(e) => (root.to_path_buf(), Err(e.to_string())),
        };

        let id = self.next_id;
        self.next_id += 1;
        self.session = ScanSession::new(id, root.clone(), config, Some(self.clock.now()));
        log::info!("Session {} created for {}", id, root.display());

        if let Err(e) = self.session.config.validate() {
            self.fail(&e);
            return Err(e);
        }

        let root_ok = resolved.and_then(|()| match self.fs.metadata(&root) {
            Ok(meta) if meta.is_dir() => {
                self.fs.read_dir(&root).map(|_| ()).map_err(|e| e.to_string())
            }
            Ok(_) => Err("not a directory".to_string()),
            Err(e) => Err(e.to_string()),
        });
        if let Err(reason) = root_ok {
            let err = EngineError::InvalidRoot { path: root, reason };
            self.fail(&err);
            return Err(err);
        }

        self.transition(ScanState::Scanning);
        Ok(SessionHandle {
            id,
            cancel: Arc::clone(&self.session.cancel_flag),
        })
    }

    /// Run the session until it needs a decision or finishes.
    ///
    /// From `Scanning` this runs discovery and hashing and returns
    /// `Grouped` (or `Cancelled`). From `Disposing` it runs the disposition
    /// and returns `Done` (or `Cancelled`). In `Grouped` or a terminal state
    /// it returns immediately.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidState`] if no scan was started
    /// - [`EngineError::WorkerPool`] if the hashing pool cannot start; the
    ///   session is left in `Failed`
    pub fn process(&mut self) -> Result<ScanState, EngineError> {
        loop {
            match self.session.state {
                ScanState::Idle => {
                    return Err(EngineError::InvalidState {
                        operation: "process",
                        state: ScanState::Idle,
                    })
                }
                ScanState::Scanning => {
                    let buckets = self.run_discovery();
                    if self.cancel_requested() {
                        self.finish(ScanState::Cancelled);
                        continue;
                    }
                    self.transition(ScanState::Hashing);
                    if let Err(e) = self.run_hashing(buckets) {
                        self.fail(&e);
                        return Err(e);
                    }
                }
                ScanState::Hashing => {
                    // run_hashing always leaves Hashing; reaching here means it was interrupted
                    self.finish(ScanState::Cancelled);
                }
                ScanState::Disposing => self.run_disposition(),
                state @ (ScanState::Grouped
                | ScanState::Done
                | ScanState::Cancelled
                | ScanState::Failed) => return Ok(state),
            }
        }
    }

    /// Approve disposing the redundant copies in every group.
    ///
    /// Moves the session from `Grouped` to `Disposing`; call
    /// [`process`](Self::process) to carry it out.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownSession`] for a stale handle
    /// - [`EngineError::InvalidState`] unless the session is `Grouped`
    pub fn confirm_disposition(
        &mut self,
        handle: &SessionHandle,
        action: DispositionAction,
    ) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        if self.session.state != ScanState::Grouped {
            return Err(EngineError::InvalidState {
                operation: "confirm disposition",
                state: self.session.state,
            });
        }
        if let DispositionAction::MoveTo(dest) = &action {
            if dest.as_os_str().is_empty() {
                return Err(EngineError::FatalConfig(
                    "move destination must not be empty".to_string(),
                ));
            }
        }

        log::info!("Disposition confirmed for session {}: {:?}", handle.id, action);
        self.session.action = Some(action);
        self.transition(ScanState::Disposing);
        Ok(())
    }

    /// Cancel the session.
    ///
    /// A session parked in `Grouped` (or not yet processed) becomes
    /// `Cancelled` immediately. Work in progress stops at the next file.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownSession`] for a stale handle
    /// - [`EngineError::InvalidState`] if the session is already terminal
    pub fn cancel(&mut self, handle: &SessionHandle) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        if self.session.state.is_terminal() || self.session.state == ScanState::Idle {
            return Err(EngineError::InvalidState {
                operation: "cancel",
                state: self.session.state,
            });
        }

        handle.cancel();
        log::info!("Cancellation requested for session {}", handle.id);
        if matches!(self.session.state, ScanState::Scanning | ScanState::Grouped) {
            self.finish(ScanState::Cancelled);
        }
        Ok(())
    }

    /// Disposition results for a finished session.
    ///
    /// A session cancelled before disposition reports an empty summary.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownSession`] for a stale handle
    /// - [`EngineError::InvalidState`] unless the session is `Done` or `Cancelled`
    pub fn summary(&self, handle: &SessionHandle) -> Result<DispositionSummary, EngineError> {
        self.check_handle(handle)?;
        match self.session.state {
            ScanState::Done | ScanState::Cancelled => {
                Ok(self.session.disposition.clone().unwrap_or_default())
            }
            state => Err(EngineError::InvalidState {
                operation: "summarize",
                state,
            }),
        }
    }

    fn check_handle(&self, handle: &SessionHandle) -> Result<(), EngineError> {
        if handle.id != self.session.id || self.session.id == 0 {
            return Err(EngineError::UnknownSession(handle.id));
        }
        Ok(())
    }

    fn cancel_requested(&self) -> bool {
        self.session.cancel_flag.load(Ordering::SeqCst)
    }

    fn transition(&mut self, next: ScanState) {
        debug_assert!(
            self.session.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.session.state,
            next
        );
        log::debug!(
            "Session {}: {} -> {}",
            self.session.id,
            self.session.state,
            next
        );
        self.session.state = next;
        self.events.send(EngineEvent::StageChanged { state: next });
    }

    fn finish(&mut self, terminal: ScanState) {
        self.session.finished_at = Some(self.clock.now());
        log::info!("Session {} {}", self.session.id, terminal);
        self.transition(terminal);
    }

    fn fail(&mut self, error: &EngineError) {
        log::error!("Session {} failed: {}", self.session.id, error);
        self.session.failure = Some(error.to_string());
        self.finish(ScanState::Failed);
    }

    fn record_warning(&mut self, warning: ScanWarning) {
        self.session.counters.warnings += 1;
        self.events.send(EngineEvent::Warning {
            path: warning.path().to_path_buf(),
            reason: warning.to_string(),
        });
        self.session.warnings.push(warning);
    }

    fn run_discovery(&mut self) -> Vec<SizeBucket> {
        let walker = PathWalker::new(
            Arc::clone(&self.fs),
            &self.session.root,
            &self.session.config,
        )
        .with_shutdown_flag(Arc::clone(&self.session.cancel_flag));

        let mut bucketer = SizeBucketer::new();
        for item in walker.walk() {
            match item {
                Ok(record) => {
                    self.session.counters.files_scanned += 1;
                    self.session.counters.bytes_scanned += record.size;
                    self.events.send(EngineEvent::Progress {
                        files_scanned: self.session.counters.files_scanned,
                        bytes_scanned: self.session.counters.bytes_scanned,
                    });
                    bucketer.push(record);
                }
                Err(warning) => self.record_warning(warning),
            }
        }

        let (buckets, _stats) = bucketer.finish();
        buckets
    }

    fn run_hashing(&mut self, buckets: Vec<SizeBucket>) -> Result<(), EngineError> {
        let config = PipelineConfig::default()
            .with_io_threads(self.options.io_threads)
            .with_algorithm(self.options.digest)
            .with_shutdown_flag(Arc::clone(&self.session.cancel_flag));
        let pipeline = HashPipeline::new(Arc::clone(&self.fs), config)?;
        let mut grouper = DuplicateGrouper::new(Arc::clone(&self.options.keeper));

        let outcome = pipeline.run(buckets, |event| match event {
            PipelineEvent::Hashed { bytes, .. } => {
                self.session.counters.files_hashed += 1;
                self.session.counters.bytes_hashed += bytes;
                self.events.send(EngineEvent::HashProgress {
                    files_hashed: self.session.counters.files_hashed,
                    bytes_hashed: self.session.counters.bytes_hashed,
                });
            }
            PipelineEvent::Warning(warning) => self.record_warning(warning),
            PipelineEvent::BucketResolved(matches) => {
                for matched in matches {
                    grouper.add(matched);
                }
            }
        });

        let totals = grouper.totals();
        self.session.groups = grouper.into_groups();
        self.session.counters.duplicates_found = totals.duplicate_files as u64;
        self.session.counters.bytes_reclaimable = totals.reclaimable_bytes;

        if outcome.interrupted || self.cancel_requested() {
            log::info!(
                "Hashing interrupted; keeping {} groups from completed buckets",
                totals.groups
            );
            self.finish(ScanState::Cancelled);
            return Ok(());
        }

        log::info!(
            "Found {} duplicate groups ({} redundant files, {} bytes reclaimable)",
            totals.groups,
            totals.duplicate_files,
            totals.reclaimable_bytes
        );
        self.transition(ScanState::Grouped);
        self.events.send(EngineEvent::GroupsReady {
            groups: self.session.groups.clone(),
            total_reclaimable_bytes: totals.reclaimable_bytes,
        });
        Ok(())
    }

    fn run_disposition(&mut self) {
        let Some(action) = self.session.action.clone() else {
            // confirm_disposition always records an action before Disposing
            self.finish(ScanState::Done);
            return;
        };

        let executor = DispositionExecutor::new(self.fs.as_ref(), self.options.disposition.clone());
        let events = &self.events;
        let summary = executor.execute(
            &mut self.session.groups,
            &action,
            &self.session.root,
            Some(self.session.cancel_flag.as_ref()),
            |record| {
                events.send(EngineEvent::FileDisposed {
                    path: record.path.clone(),
                    outcome: record.outcome.clone(),
                });
            },
        );

        let interrupted = summary.interrupted;
        self.session.disposition = Some(summary);
        self.finish(if interrupted {
            ScanState::Cancelled
        } else {
            ScanState::Done
        });
    }
}
