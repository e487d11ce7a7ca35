use crate::sources::{enumerate_sources, LogSource};
use crate::ScanError;
use abr_core::{AggregateState, DailyTally, LogRecord, MatchEvent, PatternSet};
use chrono::NaiveDate;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub records: usize,
    pub skipped_lines: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub unreadable_files: usize,
    pub records_seen: usize,
    pub skipped_lines: usize,
    pub missing_root: bool,
}

impl ScanReport {
    fn absorb(&mut self, stats: FileStats) {
        self.files_scanned += 1;
        self.records_seen += stats.records;
        self.skipped_lines += stats.skipped_lines;
    }
}

/// Result of one incremental watcher pass.
#[derive(Debug, Default, Clone)]
pub struct PassOutcome {
    pub report: ScanReport,
    /// Matches that were newly applied to the state, in scan order.
    pub new_matches: Vec<MatchEvent>,
}

/// Result of a full-corpus backfill.
#[derive(Debug, Default, Clone)]
pub struct BackfillOutcome {
    pub report: ScanReport,
    pub tally: DailyTally,
}

/// Streams every assistant record of one log file into `visit`.
///
/// Blank lines, lines that are not JSON and records that are not assistant
/// messages with an id are counted as skipped and otherwise ignored.
pub fn scan_file(path: &Path, mut visit: impl FnMut(LogRecord)) -> io::Result<FileStats> {
    let reader = BufReader::new(File::open(path)?);
    let mut stats = FileStats::default();

    for line in reader.split(b'\n') {
        let line = line?;
        let text = String::from_utf8_lossy(&line);
        if text.trim().is_empty() {
            continue;
        }
        match LogRecord::parse_line(&text) {
            Some(record) => {
                stats.records += 1;
                visit(record);
            }
            None => stats.skipped_lines += 1,
        }
    }

    Ok(stats)
}

/// One watcher pass over every log file under `root`.
///
/// Records whose id is already in `state.processed_ids` are never
/// re-evaluated. Unreadable files are skipped with a warning; matches applied
/// before a mid-file read error stay applied.
pub fn scan_pass(
    root: &Path,
    patterns: &PatternSet,
    state: &mut AggregateState,
    today: NaiveDate,
) -> Result<PassOutcome, ScanError> {
    let mut outcome = PassOutcome::default();

    for source in enumerate_sources(root)? {
        let new_matches = &mut outcome.new_matches;
        let result = scan_file(&source.path, |record| {
            if state.is_processed(&record.id) {
                return;
            }
            if let Some(event) = patterns.evaluate(&record, &source.project, today) {
                if state.apply_match(&event) {
                    new_matches.push(event);
                }
            }
        });
        record_file_result(&mut outcome.report, &source, result);
    }

    Ok(outcome)
}

/// Recomputes day-level counts from the whole corpus.
///
/// Every matching record counts once per occurrence in the corpus; no id set
/// is consulted. A missing root yields an empty outcome with
/// `report.missing_root` set.
pub fn backfill_scan(root: &Path, patterns: &PatternSet, today: NaiveDate) -> BackfillOutcome {
    let mut outcome = BackfillOutcome::default();

    let sources = match enumerate_sources(root) {
        Ok(sources) => sources,
        Err(ScanError::MissingRoot(path)) => {
            warn!(root = %path.display(), "projects directory not found");
            outcome.report.missing_root = true;
            return outcome;
        }
        Err(err) => {
            warn!(root = %root.display(), error = %err, "cannot list projects directory");
            return outcome;
        }
    };

    for source in sources {
        let tally = &mut outcome.tally;
        let result = scan_file(&source.path, |record| {
            if let Some(event) = patterns.evaluate(&record, &source.project, today) {
                tally.record(&event);
            }
        });
        record_file_result(&mut outcome.report, &source, result);
    }

    outcome
}

fn record_file_result(report: &mut ScanReport, source: &LogSource, result: io::Result<FileStats>) {
    match result {
        Ok(stats) => {
            debug!(
                path = %source.path.display(),
                project = %source.project,
                records = stats.records,
                skipped = stats.skipped_lines,
                "scanned log file"
            );
            report.absorb(stats);
        }
        Err(err) => {
            warn!(path = %source.path.display(), error = %err, "error reading log file");
            report.unreadable_files += 1;
        }
    }
}
