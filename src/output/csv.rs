//! CSV report, one row per file in every duplicate group.
//!
//! # Columns
//!
//! - `group_id`: Group number
//! - `role`: `keeper` or `disposable`
//! - `path`: File path as discovered
//! - `size`: File size in bytes
//! - `modified`: Last modified time (RFC 3339)
//! - `digest`: Confirmation digest (hexadecimal)
//! - `status`: Disposition status of a disposable copy, empty for the keeper
//! - `detail`: Destination of a moved file or reason for a failure

use std::io;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::duplicates::{DispositionStatus, DuplicateGroup, MemberRole};

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    group_id: usize,
    role: &'static str,
    path: String,
    size: u64,
    modified: String,
    digest: &'a str,
    status: &'static str,
    detail: String,
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    groups: &'a [DuplicateGroup],
}

impl<'a> CsvOutput<'a> {
    /// Create a new CSV output formatter.
    #[must_use]
    pub fn new(groups: &'a [DuplicateGroup]) -> Self {
        Self { groups }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        for group in self.groups {
            let digest = group.digest_hex();
            for member in &group.members {
                let (role, status, detail) = match &member.role {
                    MemberRole::Keeper => ("keeper", "", String::new()),
                    MemberRole::Disposable(status) => {
                        let (status, detail) = describe(status);
                        ("disposable", status, detail)
                    }
                };
                let modified: DateTime<Utc> = member.record.modified.into();
                csv_writer.serialize(CsvRow {
                    group_id: group.id,
                    role,
                    path: member.record.path.to_string_lossy().into_owned(),
                    size: group.size,
                    modified: modified.to_rfc3339(),
                    digest: &digest,
                    status,
                    detail,
                })?;
            }
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

fn describe(status: &DispositionStatus) -> (&'static str, String) {
    match status {
        DispositionStatus::Pending => ("pending", String::new()),
        DispositionStatus::Moved { destination } => {
            ("moved", destination.to_string_lossy().into_owned())
        }
        DispositionStatus::Deleted { trashed: true } => ("trashed", String::new()),
        DispositionStatus::Deleted { trashed: false } => ("deleted", String::new()),
        DispositionStatus::Failed { reason } => ("failed", reason.clone()),
    }
}
