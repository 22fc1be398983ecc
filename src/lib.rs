//! dupsweep - duplicate file finder
//!
//! Finds byte-identical files under a directory with staged hashing (size,
//! then a CRC32 checksum, then a BLAKE3 or SHA-256 digest) and moves or
//! deletes every redundant copy after confirmation, keeping one file per
//! group.
//!
//! The engine lives in [`session::ScanController`]; everything else in this
//! crate is either a stage it drives or the command-line shell around it.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod fs;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod signal;

use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytesize::ByteSize;

use crate::actions::{DeleteMode, DispositionAction};
use crate::cli::{Cli, Commands, ScanArgs};
use crate::config::Config;
use crate::error::ExitCode;
use crate::fs::{OsFileSystem, SystemClock};
use crate::session::{event_channel, ScanController, ScanSession, ScanState};

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error for fatal configuration problems, an invalid scan root,
/// or a failure writing the report.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    match cli.command {
        Commands::Scan(args) => handle_scan(&args, cli.config.as_deref(), cli.quiet),
    }
}

fn handle_scan(args: &ScanArgs, config_path: Option<&Path>, quiet: bool) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    config.merge_scan_args(args);
    config.validate()?;
    if args.save_config {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(Config::default_path)
            .context("No config directory available; pass --config FILE")?;
        config.save(&path)?;
    }

    let action = requested_action(args, &config)?;
    let shutdown = signal::install_handler()?;

    let (events, receiver) = event_channel(config.event_queue_capacity);
    let renderer = progress::spawn_renderer(receiver, quiet);

    let mut controller = ScanController::new(
        Arc::new(OsFileSystem::new()),
        Arc::new(SystemClock),
        events,
        config.engine_options(),
    );
    let handle = controller
        .start_scan(&args.path, config.scan.clone())
        .with_context(|| format!("Cannot scan {}", args.path.display()))?;
    shutdown.attach(&handle);

    let mut state = controller.process()?;
    if state == ScanState::Grouped && !controller.session().groups().is_empty() {
        if let Some(action) = action {
            if args.yes || confirm(&action, controller.session(), config.delete_mode)? {
                controller.confirm_disposition(&handle, action)?;
                state = controller.process()?;
            } else {
                log::info!("Disposition declined; no files were changed");
            }
        }
    }

    let session = controller.into_session();
    let render_stats = renderer.join().unwrap_or_default();
    log::debug!(
        "Renderer saw {} warnings and {} disposed files",
        render_stats.warnings.len(),
        render_stats.files_disposed
    );

    if state == ScanState::Failed {
        anyhow::bail!(
            "Scan failed: {}",
            session.failure().unwrap_or("unknown error")
        );
    }

    let exit_code = exit_code_for(&session);
    match &args.output_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create report file {}", path.display()))?;
            yansi::disable();
            let mut writer = BufWriter::new(file);
            output::write_report(config.output, &session, exit_code, &mut writer)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            output::write_report(config.output, &session, exit_code, &mut writer)?;
        }
    }
    Ok(exit_code)
}

/// A bare `--move-to` uses the configured destination.
fn requested_action(args: &ScanArgs, config: &Config) -> anyhow::Result<Option<DispositionAction>> {
    match &args.move_to {
        Some(Some(dest)) => Ok(Some(DispositionAction::MoveTo(dest.clone()))),
        Some(None) => config
            .move_to
            .clone()
            .map(|dest| Some(DispositionAction::MoveTo(dest)))
            .context("--move-to needs a directory: none given and no move_to configured"),
        None if args.delete => Ok(Some(DispositionAction::Delete)),
        None => Ok(None),
    }
}

/// Ask on stderr; anything but `y` or `yes` declines.
fn confirm(action: &DispositionAction, session: &ScanSession, mode: DeleteMode) -> io::Result<bool> {
    let files: usize = session.groups().iter().map(|g| g.duplicate_count()).sum();
    let verb = match action {
        DispositionAction::MoveTo(dest) => format!("Move to {}", dest.display()),
        DispositionAction::Delete if mode == DeleteMode::Permanent => "Permanently delete".to_string(),
        DispositionAction::Delete => "Move to trash".to_string(),
    };
    let mut stderr = io::stderr();
    write!(
        stderr,
        "{verb} {files} redundant file(s), reclaiming {}? [y/N] ",
        ByteSize::b(session.reclaimable_bytes())
    )?;
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn exit_code_for(session: &ScanSession) -> ExitCode {
    if session.state() == ScanState::Cancelled {
        return ExitCode::Interrupted;
    }
    let disposition_failed = session
        .disposition()
        .is_some_and(|summary| !summary.all_succeeded());
    if !session.warnings().is_empty() || disposition_failed {
        ExitCode::PartialSuccess
    } else if session.groups().is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    }
}
