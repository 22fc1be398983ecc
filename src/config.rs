//! Application configuration management.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory (or `--config FILE`)
//! 3. `DUPSWEEP_*` environment variables, `__` separating nested keys
//!    (e.g. `DUPSWEEP_SCAN__MIN_SIZE=1024`)
//! 4. Command-line flags, via [`Config::merge_scan_args`]
//!
//! ```toml
//! io_threads = 8
//! keep = "shallowest"
//!
//! [scan]
//! categories = ["image", "video"]
//! min_size = 4096
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::{DeleteMode, DispositionOptions, MoveLayout};
use crate::cli::{OutputFormat, ScanArgs};
use crate::duplicates::{default_io_threads, KeepRule};
use crate::error::EngineError;
use crate::scanner::{DigestAlgorithm, ScanConfig};
use crate::session::{EngineOptions, DEFAULT_EVENT_CAPACITY};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "DUPSWEEP_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hashing worker threads
    pub io_threads: usize,
    /// Confirmation digest algorithm
    pub digest: DigestAlgorithm,
    /// Keeper rule
    pub keep: KeepRule,
    /// Report format
    pub output: OutputFormat,
    /// Trash or permanent delete
    pub delete_mode: DeleteMode,
    /// Layout for moved files
    pub layout: MoveLayout,
    /// Destination used by a bare `--move-to`
    pub move_to: Option<PathBuf>,
    /// Re-check files before moving or deleting them
    pub verify_before_dispose: bool,
    /// Capacity of the engine event queue
    pub event_queue_capacity: usize,
    /// Discovery filters
    pub scan: ScanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_threads: default_io_threads(),
            digest: DigestAlgorithm::default(),
            keep: KeepRule::default(),
            output: OutputFormat::default(),
            delete_mode: DeleteMode::default(),
            layout: MoveLayout::default(),
            move_to: None,
            verify_before_dispose: true,
            event_queue_capacity: DEFAULT_EVENT_CAPACITY,
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    /// Load from `explicit` if given, otherwise from the default location.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FatalConfig`] if a layer cannot be parsed, or
    /// if an explicitly named file does not exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, EngineError> {
        match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(EngineError::FatalConfig(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Self::load_from_path(path)
            }
            None => match Self::default_path() {
                Some(path) => Self::load_from_path(&path),
                None => {
                    log::debug!("No config directory available; using defaults and environment");
                    Self::figment_without_file().extract().map_err(fatal)
                }
            },
        }
    }

    /// Load with `path` as the file layer. A missing file is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FatalConfig`] if a layer cannot be parsed.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        log::debug!("Loading config from {}", path.display());
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(fatal)
    }

    fn figment_without_file() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Platform-specific default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "dupsweep", "dupsweep")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Write this configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the file cannot be written, or
    /// [`EngineError::FatalConfig`] if serialization fails.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| EngineError::FatalConfig(format!("cannot serialize config: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| EngineError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Apply command-line flags on top of the loaded layers.
    pub fn merge_scan_args(&mut self, args: &ScanArgs) {
        if args.all_types {
            self.scan.categories.clear();
        } else if !args.categories.is_empty() {
            self.scan.categories = args.categories.clone();
        }
        if !args.extensions.is_empty() {
            self.scan.extra_extensions.extend(args.extensions.iter().cloned());
        }
        if let Some(min_size) = args.min_size {
            self.scan.min_size = min_size;
        }
        if let Some(max_size) = args.max_size {
            self.scan.max_size = max_size;
        }
        self.scan.excluded_prefixes.extend(args.exclude.iter().cloned());
        self.scan
            .ignore_patterns
            .extend(args.ignore_patterns.iter().cloned());

        if let Some(keep) = args.keep {
            self.keep = keep;
        }
        if let Some(digest) = args.digest {
            self.digest = digest;
        }
        if let Some(threads) = args.io_threads {
            self.io_threads = threads;
        }
        if let Some(output) = args.output {
            self.output = output;
        }
        if let Some(Some(dest)) = &args.move_to {
            self.move_to = Some(dest.clone());
        }
        if let Some(layout) = args.layout {
            self.layout = layout;
        }
        if let Some(mode) = args.delete_mode() {
            self.delete_mode = mode;
        }
    }

    /// Check settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FatalConfig`] for a zero thread count or queue
    /// capacity, or for contradictory scan filters.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.io_threads == 0 {
            return Err(EngineError::FatalConfig(
                "io_threads must be at least 1".to_string(),
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(EngineError::FatalConfig(
                "event_queue_capacity must be at least 1".to_string(),
            ));
        }
        self.scan.validate()
    }

    /// Engine options derived from this configuration.
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::default()
            .with_io_threads(self.io_threads)
            .with_digest(self.digest)
            .with_keeper(Arc::new(self.keep))
            .with_disposition(
                DispositionOptions::default()
                    .with_delete_mode(self.delete_mode)
                    .with_layout(self.layout)
                    .with_verify(self.verify_before_dispose),
            )
    }
}

fn fatal(err: figment::Error) -> EngineError {
    EngineError::FatalConfig(err.to_string())
}
