use crate::config::Settings;
use crate::upload::UploadClient;
use crate::watch::print_patterns;
use abr_core::{DailyTally, PatternKind};
use abr_scanner::backfill_scan;
use abr_storage::{AggregateStore, BackfillSnapshot, BACKFILL_SNAPSHOT_FILE};
use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

const RULE: &str = "--------------------------------------------------";

#[derive(Debug, Clone, Default, Args)]
pub struct BackfillArgs {
    /// Print the counts as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Collector base URL to upload every day to
    #[arg(long, value_name = "URL")]
    pub upload: Option<String>,

    /// Shared secret sent with each upload
    #[arg(long, value_name = "SECRET")]
    pub secret: Option<String>,

    /// Do not write the snapshot to the data directory
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Debug, Serialize)]
struct BackfillReport<'a> {
    total_absolutely: u64,
    total_right: u64,
    daily_absolutely: &'a BTreeMap<String, u64>,
    daily_right: &'a BTreeMap<String, u64>,
    by_date: &'a BTreeMap<String, BTreeMap<String, u64>>,
}

impl<'a> From<&'a DailyTally> for BackfillReport<'a> {
    fn from(tally: &'a DailyTally) -> Self {
        Self {
            total_absolutely: tally.total_primary(),
            total_right: tally.total_secondary(),
            daily_absolutely: &tally.primary,
            daily_right: &tally.secondary,
            by_date: &tally.by_date,
        }
    }
}

pub async fn run(settings: &Settings, args: &BackfillArgs) -> Result<()> {
    let patterns = settings.patterns().context("Invalid pattern")?;
    let upload_url = args.upload.clone().or_else(|| settings.upload_url.clone());
    let secret = args.secret.clone().or_else(|| settings.upload_secret.clone());

    if !args.json {
        println!("Claude 'Absolutely Right' Backfill");
        println!("{}", "=".repeat(RULE.len()));
        println!("Projects directory: {}", settings.projects_root.display());
        print_patterns(&patterns);
        if let Some(url) = &upload_url {
            println!("Will upload to: {url}");
        }
        println!("{RULE}");
        println!("Scanning all Claude projects...");
    }

    let outcome = backfill_scan(
        &settings.projects_root,
        &patterns,
        Local::now().date_naive(),
    );
    let tally = outcome.tally;
    info!(
        files = outcome.report.files_scanned,
        unreadable = outcome.report.unreadable_files,
        records = outcome.report.records_seen,
        skipped = outcome.report.skipped_lines,
        "backfill scan complete"
    );

    if outcome.report.missing_root {
        eprintln!(
            "Error: Projects directory not found at {}",
            settings.projects_root.display()
        );
        eprintln!("Set CLAUDE_PROJECTS env variable to your Claude projects path");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&BackfillReport::from(&tally))?);
    } else if tally.is_empty() {
        println!("No data found.");
    } else {
        print_table(&tally);
    }
    if tally.is_empty() {
        return Ok(());
    }

    if let Some(url) = upload_url {
        let client = UploadClient::new(&url, secret)?;
        let with_right = patterns.source(PatternKind::Secondary).is_some();
        upload_days(&client, &tally, with_right, !args.json).await;
    }

    if !args.no_save {
        let store = AggregateStore::open(&settings.data_dir).with_context(|| {
            format!("Failed to open data directory {}", settings.data_dir.display())
        })?;
        store
            .save_backfill_snapshot(&BackfillSnapshot::from(&tally))
            .context("Failed to save backfill snapshot")?;
        if !args.json {
            println!(
                "\nSaved daily counts to: {}",
                store.path(BACKFILL_SNAPSHOT_FILE).display()
            );
        }
    }

    Ok(())
}

fn print_table(tally: &DailyTally) {
    println!(
        "Found {} 'absolutely right' across {} days",
        tally.total_primary(),
        tally.primary.len()
    );
    println!(
        "Found {} total 'right' across {} days",
        tally.total_secondary(),
        tally.secondary.len()
    );
    println!("\nDaily counts:");
    println!("{RULE}");
    for day in tally.days() {
        println!("{}", day_line(tally, &day));
    }
    println!("{RULE}");
    println!("Total 'absolutely right': {}", tally.total_primary());
    println!("Total 'right': {}", tally.total_secondary());
}

fn day_line(tally: &DailyTally, day: &str) -> String {
    let absolutely = tally.primary.get(day).copied().unwrap_or(0);
    let right = tally.secondary.get(day).copied().unwrap_or(0);
    let mut line = format!("{day}: absolutely={absolutely:3}, right={right:3}");
    if let Some(projects) = tally.by_date.get(day).filter(|projects| projects.len() > 1) {
        let summary = projects
            .iter()
            .map(|(project, count)| format!("{project}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        line.push_str(&format!(" ({summary})"));
    }
    line
}

async fn upload_days(client: &UploadClient, tally: &DailyTally, with_right: bool, verbose: bool) {
    if verbose {
        println!("\n{RULE}");
        println!("Uploading to API...");
    }

    let mut success = 0usize;
    let mut failed = 0usize;
    for day in tally.days() {
        let absolutely = tally.primary.get(&day).copied().unwrap_or(0);
        let right = tally.secondary.get(&day).copied().unwrap_or(0);
        if absolutely == 0 && right == 0 {
            continue;
        }
        let right_count = with_right.then_some(right);
        if client.upload(&day, absolutely, right_count).await {
            success += 1;
            if verbose {
                println!("  Uploaded {day}: absolutely={absolutely}, right={right} ✓");
            }
        } else {
            failed += 1;
            if verbose {
                println!("  Failed {day}: absolutely={absolutely}, right={right} ✗");
            }
        }
    }

    info!(success, failed, endpoint = client.endpoint(), "upload complete");
    if verbose {
        println!("{RULE}");
        println!("Upload complete: {success} successful, {failed} failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abr_core::MatchEvent;
    use chrono::NaiveDate;

    fn hit(day: u32, project: &str, kinds: &[PatternKind]) -> MatchEvent {
        MatchEvent {
            record_id: format!("{project}-{day}"),
            date: NaiveDate::from_ymd_opt(2025, 5, day).expect("valid date"),
            time: None,
            project: project.to_string(),
            matched: kinds.iter().copied().collect(),
            excerpt: String::new(),
        }
    }

    #[test]
    fn day_line_lists_projects_only_when_several_contributed() {
        let mut tally = DailyTally::default();
        tally.record(&hit(1, "alpha", &[PatternKind::Primary, PatternKind::Secondary]));
        tally.record(&hit(1, "beta", &[PatternKind::Primary]));
        tally.record(&hit(2, "alpha", &[PatternKind::Primary]));
        tally.record(&hit(3, "alpha", &[PatternKind::Secondary]));

        assert_eq!(
            day_line(&tally, "2025-05-01"),
            "2025-05-01: absolutely=  2, right=  1 (alpha: 1, beta: 1)"
        );
        assert_eq!(
            day_line(&tally, "2025-05-02"),
            "2025-05-02: absolutely=  1, right=  0"
        );
        assert_eq!(
            day_line(&tally, "2025-05-03"),
            "2025-05-03: absolutely=  0, right=  1"
        );
    }

    #[test]
    fn json_report_uses_collector_field_names() {
        let mut tally = DailyTally::default();
        tally.record(&hit(4, "alpha", &[PatternKind::Primary, PatternKind::Secondary]));

        let json = serde_json::to_value(BackfillReport::from(&tally)).expect("serialize");
        assert_eq!(json["total_absolutely"], 1);
        assert_eq!(json["total_right"], 1);
        assert_eq!(json["daily_absolutely"]["2025-05-04"], 1);
        assert_eq!(json["daily_right"]["2025-05-04"], 1);
        assert_eq!(json["by_date"]["2025-05-04"]["alpha"], 1);
    }
}
