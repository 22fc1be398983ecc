//! Engine errors, process exit codes, and structured error output.

use std::path::PathBuf;

use serde::Serialize;

use crate::session::ScanState;

/// Errors returned by the engine's public operations.
///
/// Per-file problems are never reported through this type: they surface as
/// [`ScanWarning`](crate::scanner::ScanWarning) during a scan and as
/// [`DispositionError`](crate::actions::DispositionError) records in a
/// disposition summary.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The scan root is missing, unreadable, or not a directory.
    #[error("Invalid scan root {path}: {reason}")]
    InvalidRoot {
        /// Requested root
        path: PathBuf,
        /// Why the root was rejected
        reason: String,
    },

    /// An operation was requested in a state that does not allow it.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Name of the rejected operation
        operation: &'static str,
        /// State the session was in
        state: ScanState,
    },

    /// The handle does not refer to the current session.
    #[error("Unknown session {0}")]
    UnknownSession(u64),

    /// Configuration is unusable.
    #[error("Configuration error: {0}")]
    FatalConfig(String),

    /// The hashing worker pool could not be created.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// An unrecoverable I/O error outside per-file processing.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Exit codes for the dupsweep binary.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found
/// - 3: Partial success (warnings during the scan or failed dispositions)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Scan completed and duplicates were found.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Scan completed but no duplicates were found.
    NoDuplicates = 2,
    /// Completed, but some files could not be read or disposed.
    PartialSuccess = 3,
    /// Interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::NoDuplicates => "DS002",
            Self::PartialSuccess => "DS003",
            Self::Interrupted => "DS130",
        }
    }
}

/// Structured error information for `--json-errors` output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DS001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
