//! File actions on confirmed duplicates.
//!
//! The [`disposition`] module moves redundant copies into a quarantine
//! directory or deletes them (to the trash by default), one file at a time
//! with per-file error isolation:
//!
//! ```
//! use dupsweep::actions::{DispositionAction, DispositionExecutor, DispositionOptions};
//! use dupsweep::fs::MemoryFileSystem;
//! use std::path::Path;
//!
//! let fs = MemoryFileSystem::new();
//! let executor = DispositionExecutor::new(&fs, DispositionOptions::default());
//! let summary = executor.execute(&mut [], &DispositionAction::Delete, Path::new("/"), None, |_| {});
//! assert_eq!(summary.files_removed, 0);
//! ```

pub mod disposition;

pub use disposition::{
    DeleteMode, DispositionAction, DispositionError, DispositionExecutor, DispositionFailure,
    DispositionOptions, DispositionOutcome, DispositionRecord, DispositionSummary, MoveLayout,
    MAX_COLLISION_SUFFIX,
};
