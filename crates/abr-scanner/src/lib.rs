pub mod scan;
pub mod sources;

pub use scan::{
    backfill_scan, scan_file, scan_pass, BackfillOutcome, FileStats, PassOutcome, ScanReport,
};
pub use sources::{enumerate_sources, LogSource, LOG_FILE_EXTENSION};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("projects directory not found at {}", .0.display())]
    MissingRoot(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
