//! Terminal progress display driven by engine events, using indicatif.
//!
//! [`spawn_renderer`] drains the engine's event queue on its own thread and
//! draws one spinner per stage. The thread ends when the controller (and so
//! the sending half of the queue) is dropped, returning what it saw.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytesize::ByteSize;
use crossbeam_channel::Receiver;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::session::{EngineEvent, ScanState};

/// What the renderer observed, returned when its thread ends.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderStats {
    /// Warnings, in arrival order
    pub warnings: Vec<(PathBuf, String)>,
    /// Files that were moved or deleted
    pub files_disposed: usize,
    /// Last state announced
    pub last_state: Option<ScanState>,
}

/// Event-driven progress display.
pub struct Progress {
    multi: MultiProgress,
    active: Option<ProgressBar>,
    stats: RenderStats,
    quiet: bool,
}

impl Progress {
    /// Create a progress display. A quiet display draws nothing.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            active: None,
            stats: RenderStats::default(),
            quiet,
        }
    }

    fn spinner(&mut self, message: &'static str) {
        self.finish_active();
        if self.quiet {
            return;
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix} [{elapsed_precise}] {pos} files {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
        );
        pb.set_prefix(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.active = Some(pb);
    }

    fn finish_active(&mut self) {
        if let Some(pb) = self.active.take() {
            pb.finish_and_clear();
        }
    }

    /// Update the display for one event.
    pub fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StageChanged { state } => {
                self.stats.last_state = Some(state);
                match state {
                    ScanState::Scanning => self.spinner("Scanning"),
                    ScanState::Hashing => self.spinner("Hashing"),
                    ScanState::Disposing => self.spinner("Disposing"),
                    _ => self.finish_active(),
                }
            }
            EngineEvent::Progress {
                files_scanned,
                bytes_scanned,
            } => {
                if let Some(pb) = &self.active {
                    pb.set_position(files_scanned);
                    pb.set_message(format!("({})", ByteSize::b(bytes_scanned)));
                }
            }
            EngineEvent::HashProgress {
                files_hashed,
                bytes_hashed,
            } => {
                if let Some(pb) = &self.active {
                    pb.set_position(files_hashed);
                    pb.set_message(format!("({} read)", ByteSize::b(bytes_hashed)));
                }
            }
            EngineEvent::Warning { path, reason } => {
                if let Some(pb) = &self.active {
                    pb.println(format!("warning: {reason}"));
                }
                self.stats.warnings.push((path, reason));
            }
            EngineEvent::GroupsReady { .. } => self.finish_active(),
            EngineEvent::FileDisposed { outcome, .. } => {
                if outcome.is_success() {
                    self.stats.files_disposed += 1;
                }
                if let Some(pb) = &self.active {
                    pb.inc(1);
                }
            }
        }
    }

    /// Clear the display and return the collected stats.
    #[must_use]
    pub fn finish(mut self) -> RenderStats {
        self.finish_active();
        self.stats
    }
}

/// Drain `events` on a background thread until every sender is dropped.
#[must_use]
pub fn spawn_renderer(events: Receiver<EngineEvent>, quiet: bool) -> JoinHandle<RenderStats> {
    thread::spawn(move || {
        let mut progress = Progress::new(quiet);
        for event in events {
            progress.handle(event);
        }
        progress.finish()
    })
}
