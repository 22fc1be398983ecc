//! Command-line interface definitions for dupsweep.
//!
//! # Example
//!
//! ```bash
//! # Report duplicate photos, videos and documents
//! dupsweep scan ~/Pictures
//!
//! # JSON report of every file type above 1 MiB
//! dupsweep scan ~/Downloads --all-types --min-size 1MiB --output json
//!
//! # Quarantine redundant copies, keeping the shallowest path
//! dupsweep scan ~/Pictures --keep shallowest --move-to ~/dupes
//!
//! # Send redundant copies to the trash without prompting
//! dupsweep scan ~/Pictures --delete --yes
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::actions::{DeleteMode, MoveLayout};
use crate::duplicates::KeepRule;
use crate::scanner::{DigestAlgorithm, FileCategory};

/// Duplicate file finder with staged hashing and safe quarantine or deletion.
#[derive(Debug, Parser)]
#[command(name = "dupsweep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory for duplicate files
    Scan(ScanArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// File categories to include (repeatable)
    #[arg(short = 'c', long = "category", value_enum, value_name = "CATEGORY")]
    pub categories: Vec<FileCategory>,

    /// Include every file type
    #[arg(long, conflicts_with = "categories")]
    pub all_types: bool,

    /// Extra extensions to include regardless of category (repeatable)
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Minimum file size (e.g., 1KB, 1MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size (e.g., 500MB, 2GiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Path prefix to skip (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "PATH")]
    pub exclude: Vec<PathBuf>,

    /// Gitignore-style pattern to skip (repeatable)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Which copy of each group to keep
    #[arg(short, long, value_enum)]
    pub keep: Option<KeepRule>,

    /// Confirmation digest algorithm
    #[arg(long, value_enum)]
    pub digest: Option<DigestAlgorithm>,

    /// Number of hashing threads
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Move redundant copies into DIR, or the configured `move_to` if DIR is omitted
    #[arg(long, value_name = "DIR", num_args = 0..=1, conflicts_with = "delete")]
    pub move_to: Option<Option<PathBuf>>,

    /// Layout of moved files under --move-to
    #[arg(long, value_enum, requires = "move_to")]
    pub layout: Option<MoveLayout>,

    /// Delete redundant copies (to the trash unless --permanent)
    #[arg(long)]
    pub delete: bool,

    /// Delete permanently instead of using the trash
    #[arg(long, requires = "delete")]
    pub permanent: bool,

    /// Do not ask for confirmation before moving or deleting
    #[arg(short, long)]
    pub yes: bool,

    /// Save the effective settings as the new configuration file
    #[arg(long)]
    pub save_config: bool,
}

impl ScanArgs {
    /// The delete mode implied by the flags, if any was given.
    #[must_use]
    pub fn delete_mode(&self) -> Option<DeleteMode> {
        if self.permanent {
            Some(DeleteMode::Permanent)
        } else {
            None
        }
    }
}

/// Report formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON document
    Json,
    /// CSV, one row per file
    Csv,
}

/// Parse a human-readable size such as `10MB` or `1.5GiB` into bytes.
///
/// # Errors
///
/// Returns an error for an empty string, a malformed number, a negative
/// value or an unknown suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
