//! Report formatters for scan sessions.
//!
//! - Text for people, colored with yansi
//! - JSON for automation and scripting ([`json::JsonReport`])
//! - CSV for spreadsheet import ([`csv::CsvOutput`])
//!
//! # Example
//!
//! ```no_run
//! use dupsweep::cli::OutputFormat;
//! use dupsweep::error::ExitCode;
//! use dupsweep::output::write_report;
//! # fn demo(session: &dupsweep::session::ScanSession) -> anyhow::Result<()> {
//! write_report(OutputFormat::Json, session, ExitCode::Success, &mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

pub mod csv;
pub mod json;

use std::io::Write;

use bytesize::ByteSize;
use yansi::Paint;

use crate::cli::OutputFormat;
use crate::duplicates::{DispositionStatus, DuplicateGroup, MemberRole};
use crate::error::ExitCode;
use crate::session::{ScanSession, ScanState};

pub use csv::{CsvOutput, CsvOutputError};
pub use json::{JsonOutputError, JsonReport};

/// Errors writing any report format.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error(transparent)]
    Json(#[from] JsonOutputError),

    #[error(transparent)]
    Csv(#[from] CsvOutputError),

    #[error("I/O error writing report: {0}")]
    Io(#[from] std::io::Error),
}

/// Write the session report in `format`.
///
/// # Errors
///
/// Returns [`OutputError`] if formatting or writing fails.
pub fn write_report<W: Write>(
    format: OutputFormat,
    session: &ScanSession,
    exit_code: ExitCode,
    writer: &mut W,
) -> Result<(), OutputError> {
    match format {
        OutputFormat::Text => write_text_report(session, writer)?,
        OutputFormat::Json => JsonReport::new(session, exit_code).write_to(writer, true)?,
        OutputFormat::Csv => CsvOutput::new(session.groups()).write_to(writer)?,
    }
    Ok(())
}

/// Human-readable listing of every group followed by totals.
///
/// # Errors
///
/// Returns an I/O error if writing fails.
pub fn write_text_report<W: Write>(session: &ScanSession, writer: &mut W) -> std::io::Result<()> {
    for group in session.groups() {
        write_group(group, writer)?;
    }

    let counters = session.counters();
    writeln!(
        writer,
        "{} {} files scanned ({}), {} duplicate groups, {} redundant copies, {} reclaimable",
        "Summary:".bold(),
        counters.files_scanned,
        ByteSize::b(counters.bytes_scanned),
        session.groups().len(),
        counters.duplicates_found,
        ByteSize::b(counters.bytes_reclaimable).green().bold(),
    )?;

    if !session.warnings().is_empty() {
        writeln!(
            writer,
            "{} {} path(s) could not be read",
            "Warnings:".yellow().bold(),
            session.warnings().len()
        )?;
        for warning in session.warnings() {
            writeln!(writer, "  {}", warning.dim())?;
        }
    }

    if let Some(summary) = session.disposition() {
        writeln!(writer, "{}", summary.summary())?;
        for failure in &summary.failures {
            writeln!(
                writer,
                "  {} {}: {}",
                "failed".red(),
                failure.path.display(),
                failure.reason
            )?;
        }
    }

    match session.state() {
        ScanState::Cancelled => writeln!(writer, "{}", "Scan cancelled; results are partial.".yellow())?,
        ScanState::Failed => {
            if let Some(reason) = session.failure() {
                writeln!(writer, "{} {reason}", "Scan failed:".red().bold())?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn write_group<W: Write>(group: &DuplicateGroup, writer: &mut W) -> std::io::Result<()> {
    let digest = group.digest_hex();
    writeln!(
        writer,
        "{} {} files of {} ({} reclaimable) [{}]",
        format!("Group {}:", group.id).cyan().bold(),
        group.len(),
        ByteSize::b(group.size),
        ByteSize::b(group.reclaimable_bytes()),
        &digest[..16.min(digest.len())],
    )?;
    for member in &group.members {
        let path = member.record.path.display();
        match &member.role {
            MemberRole::Keeper => writeln!(writer, "  {} {path}", "keep   ".green())?,
            MemberRole::Disposable(DispositionStatus::Pending) => {
                writeln!(writer, "  {} {path}", "dup    ".yellow())?;
            }
            MemberRole::Disposable(DispositionStatus::Moved { destination }) => writeln!(
                writer,
                "  {} {path} -> {}",
                "moved  ".blue(),
                destination.display()
            )?,
            MemberRole::Disposable(DispositionStatus::Deleted { trashed }) => {
                let label = if *trashed { "trashed" } else { "deleted" };
                writeln!(writer, "  {} {path}", label.blue())?;
            }
            MemberRole::Disposable(DispositionStatus::Failed { reason }) => {
                writeln!(writer, "  {} {path} ({reason})", "failed ".red())?;
            }
        }
    }
    writeln!(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::DispositionAction;
    use crate::fs::{MemoryFileSystem, SystemClock};
    use crate::scanner::ScanConfig;
    use crate::session::{EngineOptions, EventSender, ScanController};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn controller() -> (ScanController, Arc<MemoryFileSystem>) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_dir("/data");
        fs.add_file("/data/a.txt", b"same", SystemTime::UNIX_EPOCH);
        fs.add_file("/data/b.txt", b"same", SystemTime::UNIX_EPOCH);
        let controller = ScanController::new(
            fs.clone(),
            Arc::new(SystemClock),
            EventSender::discard(),
            EngineOptions::default().with_io_threads(2),
        );
        (controller, fs)
    }

    fn render(session: &ScanSession) -> String {
        yansi::disable();
        let mut buffer = Vec::new();
        write_text_report(session, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_text_report_lists_groups() {
        let (mut controller, _fs) = controller();
        controller
            .start_scan(Path::new("/data"), ScanConfig::all_files())
            .unwrap();
        controller.process().unwrap();

        let text = render(controller.session());

        assert!(text.contains("Group 1: 2 files of 4 B (4 B reclaimable)"));
        assert!(text.contains("keep    /data/a.txt"));
        assert!(text.contains("dup     /data/b.txt"));
        assert!(text.contains("2 files scanned"));
    }

    #[test]
    fn test_text_report_after_disposition() {
        let (mut controller, _fs) = controller();
        let handle = controller
            .start_scan(Path::new("/data"), ScanConfig::all_files())
            .unwrap();
        controller.process().unwrap();
        controller
            .confirm_disposition(&handle, DispositionAction::Delete)
            .unwrap();
        controller.process().unwrap();

        let text = render(controller.session());

        assert!(text.contains("trashed /data/b.txt"));
        assert!(text.contains("Disposed 1 file(s), reclaimed 4 B"));
    }

    #[test]
    fn test_write_report_csv() {
        let (mut controller, _fs) = controller();
        controller
            .start_scan(Path::new("/data"), ScanConfig::all_files())
            .unwrap();
        controller.process().unwrap();

        let mut buffer = Vec::new();
        write_report(
            OutputFormat::Csv,
            controller.session(),
            ExitCode::Success,
            &mut buffer,
        )
        .unwrap();

        assert_eq!(String::from_utf8(buffer).unwrap().lines().count(), 3);
    }
}
