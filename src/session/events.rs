//! Engine events delivered to the caller over a bounded queue.
//!
//! The queue is a bounded crossbeam channel. When it is full, the engine
//! blocks until the consumer catches up; events are never dropped while a
//! receiver exists. Once the receiver is gone, events are discarded.

use std::path::PathBuf;

use crossbeam_channel::{bounded, Receiver, Sender};

use super::data::ScanState;
use crate::actions::DispositionOutcome;
use crate::duplicates::DuplicateGroup;

/// Default capacity of the event queue.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Something the caller may want to display or record.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The session entered a new state.
    StageChanged {
        /// New state
        state: ScanState,
    },
    /// Discovery progress.
    Progress {
        /// Files accepted so far
        files_scanned: u64,
        /// Bytes in those files
        bytes_scanned: u64,
    },
    /// Hashing progress.
    HashProgress {
        /// Hashing stage completions so far
        files_hashed: u64,
        /// Bytes read so far
        bytes_hashed: u64,
    },
    /// A path was skipped.
    Warning {
        /// The path
        path: PathBuf,
        /// Why it was skipped
        reason: String,
    },
    /// Grouping finished.
    GroupsReady {
        /// All duplicate groups
        groups: Vec<DuplicateGroup>,
        /// Bytes freed if every disposable copy is removed
        total_reclaimable_bytes: u64,
    },
    /// One disposable copy was acted on.
    FileDisposed {
        /// Original path
        path: PathBuf,
        /// What happened to it
        outcome: DispositionOutcome,
    },
}

/// Sending half of the event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<Sender<EngineEvent>>,
}

impl EventSender {
    /// A sender that drops every event.
    #[must_use]
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Deliver an event, blocking while the queue is full.
    pub fn send(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                log::trace!("Event receiver dropped; discarding event");
            }
        }
    }
}

/// Create a bounded event queue holding at most `capacity` undelivered events.
#[must_use]
pub fn event_channel(capacity: usize) -> (EventSender, Receiver<EngineEvent>) {
    let (tx, rx) = bounded(capacity.max(1));
    (EventSender { tx: Some(tx) }, rx)
}
