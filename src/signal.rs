//! Ctrl+C handling.
//!
//! A [`ShutdownHandler`] records that shutdown was requested and forwards
//! the request to the attached scan session, so discovery, hashing and
//! disposition all stop at the next file boundary.
//!
//! ```rust,no_run
//! use dupsweep::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! // handler.attach(&session_handle);
//! if handler.is_shutdown_requested() {
//!     // exit with code 130
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::session::SessionHandle;

/// Forwards shutdown requests to the current session.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
    session: Arc<Mutex<Option<SessionHandle>>>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown and cancel the attached session, if any.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.lock_session().as_ref() {
            handle.cancel();
        }
    }

    /// Route future shutdown requests to `handle`. If shutdown was already
    /// requested, the session is cancelled immediately.
    pub fn attach(&self, handle: &SessionHandle) {
        *self.lock_session() = Some(handle.clone());
        if self.is_shutdown_requested() {
            handle.cancel();
        }
    }

    /// Clear the flag and detach the session.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        *self.lock_session() = None;
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<SessionHandle>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Error installing the Ctrl+C hook.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// ctrlc refused the handler
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide Ctrl+C hook, or reuse the one already installed.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the hook cannot be registered.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let hooked = handler.clone();
    ctrlc::set_handler(move || {
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing current file...");
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");
        hooked.request_shutdown();
    })?;

    let _ = GLOBAL_HANDLER.set(handler.clone());
    Ok(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{MemoryFileSystem, SystemClock};
    use crate::scanner::ScanConfig;
    use crate::session::{EngineOptions, EventSender, ScanController};
    use std::path::Path;

    fn started_session() -> (ScanController, SessionHandle) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_dir("/data");
        let mut controller = ScanController::new(
            fs,
            Arc::new(SystemClock),
            EventSender::discard(),
            EngineOptions::default(),
        );
        let handle = controller
            .start_scan(Path::new("/data"), ScanConfig::all_files())
            .unwrap();
        (controller, handle)
    }

    #[test]
    fn test_request_shutdown_cancels_attached_session() {
        let (_controller, handle) = started_session();
        let handler = ShutdownHandler::new();
        handler.attach(&handle);

        handler.request_shutdown();

        assert!(handler.is_shutdown_requested());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_attach_after_request_cancels_immediately() {
        let (_controller, handle) = started_session();
        let handler = ShutdownHandler::new();
        handler.request_shutdown();

        handler.attach(&handle);

        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_reset_detaches() {
        let (_controller, handle) = started_session();
        let handler = ShutdownHandler::new();
        handler.attach(&handle);
        handler.reset();

        handler.request_shutdown();

        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_clone_shares_state() {
        let handler = ShutdownHandler::new();
        let cloned = handler.clone();
        handler.request_shutdown();
        assert!(cloned.is_shutdown_requested());
    }

    #[test]
    fn test_shutdown_handler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ShutdownHandler>();
    }
}
