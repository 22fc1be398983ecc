//! JSON report for a scan session.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "session": { "id": 1, "root": "/photos", "state": "grouped", ... },
//!   "groups": [
//!     {
//!       "id": 1,
//!       "size": 1024,
//!       "checksum": "352441c2",
//!       "digest": "abc123...",
//!       "reclaimable_bytes": 1024,
//!       "files": [
//!         { "path": "/photos/a.jpg", "role": "keeper", "modified": "..." },
//!         { "path": "/photos/b.jpg", "role": "disposable", "status": "pending", ... }
//!       ]
//!     }
//!   ],
//!   "summary": { "duplicate_groups": 1, "reclaimable_bytes": 1024, "exit_code": 0, ... },
//!   "warnings": [ { "path": "/photos/locked", "reason": "Permission denied: ..." } ],
//!   "disposition": null
//! }
//! ```

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::actions::DispositionSummary;
use crate::duplicates::{DispositionStatus, DuplicateGroup, GroupMember, MemberRole};
use crate::error::ExitCode;
use crate::session::{ScanSession, ScanState};

/// Session metadata.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSession {
    pub id: u64,
    pub root: PathBuf,
    pub state: ScanState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure: Option<String>,
}

/// One file of a group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFile {
    pub path: PathBuf,
    pub role: &'static str,
    pub modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl JsonFile {
    fn from_member(member: &GroupMember) -> Self {
        let mut file = Self {
            path: member.record.path.clone(),
            role: "keeper",
            modified: member.record.modified.into(),
            status: None,
            destination: None,
            reason: None,
        };
        if let MemberRole::Disposable(status) = &member.role {
            file.role = "disposable";
            file.status = Some(match status {
                DispositionStatus::Pending => "pending",
                DispositionStatus::Moved { destination } => {
                    file.destination = Some(destination.clone());
                    "moved"
                }
                DispositionStatus::Deleted { trashed: true } => "trashed",
                DispositionStatus::Deleted { trashed: false } => "deleted",
                DispositionStatus::Failed { reason } => {
                    file.reason = Some(reason.clone());
                    "failed"
                }
            });
        }
        file
    }
}

/// One duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    pub id: usize,
    pub size: u64,
    pub checksum: String,
    pub digest: String,
    pub reclaimable_bytes: u64,
    pub files: Vec<JsonFile>,
}

impl JsonGroup {
    #[must_use]
    pub fn from_group(group: &DuplicateGroup) -> Self {
        Self {
            id: group.id,
            size: group.size,
            checksum: format!("{:08x}", group.checksum),
            digest: group.digest_hex(),
            reclaimable_bytes: group.reclaimable_bytes(),
            files: group.members.iter().map(JsonFile::from_member).collect(),
        }
    }
}

/// Totals for the session.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub files_hashed: u64,
    pub bytes_hashed: u64,
    pub duplicate_groups: usize,
    pub duplicate_files: u64,
    pub reclaimable_bytes: u64,
    pub warnings: u64,
    pub interrupted: bool,
    pub exit_code: i32,
    pub exit_code_name: String,
}

/// A path that produced a warning.
#[derive(Debug, Clone, Serialize)]
pub struct JsonWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// Complete JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub session: JsonSession,
    pub groups: Vec<JsonGroup>,
    pub summary: JsonSummary,
    pub warnings: Vec<JsonWarning>,
    pub disposition: Option<DispositionSummary>,
}

impl JsonReport {
    /// Build a report from the session as it stands.
    #[must_use]
    pub fn new(session: &ScanSession, exit_code: ExitCode) -> Self {
        let counters = session.counters();
        let groups = session.groups();
        Self {
            session: JsonSession {
                id: session.id(),
                root: session.root().to_path_buf(),
                state: session.state(),
                started_at: session.started_at(),
                finished_at: session.finished_at(),
                failure: session.failure().map(str::to_string),
            },
            groups: groups.iter().map(JsonGroup::from_group).collect(),
            summary: JsonSummary {
                files_scanned: counters.files_scanned,
                bytes_scanned: counters.bytes_scanned,
                files_hashed: counters.files_hashed,
                bytes_hashed: counters.bytes_hashed,
                duplicate_groups: groups.len(),
                duplicate_files: counters.duplicates_found,
                reclaimable_bytes: counters.bytes_reclaimable,
                warnings: counters.warnings,
                interrupted: session.state() == ScanState::Cancelled,
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
            warnings: session
                .warnings()
                .iter()
                .map(|w| JsonWarning {
                    path: w.path().to_path_buf(),
                    reason: w.to_string(),
                })
                .collect(),
            disposition: session.disposition().cloned(),
        }
    }

    /// Compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns [`JsonOutputError`] if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors writing a JSON report.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
