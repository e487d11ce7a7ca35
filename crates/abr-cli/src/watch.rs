use crate::config::Settings;
use crate::upload::UploadClient;
use abr_core::{AggregateState, MatchEvent, PatternKind, PatternSet};
use abr_scanner::scan_pass;
use abr_storage::AggregateStore;
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::Args;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

const RULE: &str = "--------------------------------------------------";

#[derive(Debug, Clone, Default, Args)]
pub struct WatchArgs {
    /// Seconds to sleep between scan passes
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Collector base URL to mirror touched days to
    #[arg(long, value_name = "URL")]
    pub upload: Option<String>,

    /// Shared secret sent with each upload
    #[arg(long, value_name = "SECRET")]
    pub secret: Option<String>,
}

pub async fn run(settings: &Settings, args: &WatchArgs) -> Result<()> {
    let patterns = settings.patterns().context("Invalid pattern")?;
    let store = AggregateStore::open(&settings.data_dir).with_context(|| {
        format!("Failed to open data directory {}", settings.data_dir.display())
    })?;
    let interval = args
        .interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or(settings.check_interval);
    let uploader = args
        .upload
        .clone()
        .or_else(|| settings.upload_url.clone())
        .map(|url| {
            UploadClient::new(
                &url,
                args.secret.clone().or_else(|| settings.upload_secret.clone()),
            )
        })
        .transpose()?;

    println!("Claude 'Absolutely Right' Watcher");
    println!("{}", "=".repeat(RULE.len()));
    println!("Watching: {}", settings.projects_root.display());
    println!("Data directory: {}", store.dir().display());
    print_patterns(&patterns);
    if let Some(uploader) = &uploader {
        println!("Uploading to: {}", uploader.endpoint());
    }
    println!("{RULE}");

    let mut state = store.load_state();
    if !state.is_consistent() {
        warn!(
            total = state.total,
            "persisted total disagrees with daily or project counts"
        );
    }
    println!("Current total count: {}", state.total);
    print_projects("Per-project counts:", &state);
    println!("{RULE}");

    if !settings.projects_root.is_dir() {
        eprintln!(
            "Error: Claude projects directory not found at {}",
            settings.projects_root.display()
        );
        eprintln!("Create a config file at ~/.absolutelyright_config.json with the correct path.");
        bail!(
            "projects directory not found at {}",
            settings.projects_root.display()
        );
    }

    info!(interval_secs = interval.as_secs(), "watcher started");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut dirty = false;

    loop {
        let touched = watch_pass(
            &settings.projects_root,
            &patterns,
            &store,
            &mut state,
            &mut dirty,
            Local::now().date_naive(),
        );
        if let Some(uploader) = &uploader {
            let with_right = patterns.source(PatternKind::Secondary).is_some();
            mirror_days(uploader, &state, &touched, with_right).await;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => break,
        }
    }

    println!("\n{RULE}");
    println!("Stopping watcher...");
    if dirty {
        persist(&store, &state);
    }
    println!("Final total count: {}", state.total);
    print_projects("Final per-project counts:", &state);
    Ok(())
}

/// Scans once, reports new matches and saves the counters while they are
/// dirty. `dirty` stays set until a save succeeds, so a failed save is
/// retried on the next pass. Returns the days touched by new matches.
fn watch_pass(
    root: &Path,
    patterns: &PatternSet,
    store: &AggregateStore,
    state: &mut AggregateState,
    dirty: &mut bool,
    today: NaiveDate,
) -> BTreeSet<String> {
    let mut touched = BTreeSet::new();
    match scan_pass(root, patterns, state, today) {
        Ok(outcome) => {
            if outcome.report.unreadable_files > 0 {
                warn!(
                    unreadable = outcome.report.unreadable_files,
                    "some log files could not be read"
                );
            }
            for event in &outcome.new_matches {
                announce(event);
            }
            for line in pass_summary(state.total, &outcome.new_matches) {
                println!("{line}");
            }
            if !outcome.new_matches.is_empty() {
                *dirty = true;
            }
            touched = touched_days(&outcome.new_matches);
        }
        Err(err) => warn!(error = %err, "scan pass failed"),
    }

    if *dirty {
        *dirty = !persist(store, state);
    }
    touched
}

/// Console lines describing what a pass added. Primary matches move the
/// running total; secondary-only passes are reported on their own.
fn pass_summary(total: u64, new_matches: &[MatchEvent]) -> Vec<String> {
    let primary = count_kind(new_matches, PatternKind::Primary);
    let secondary = count_kind(new_matches, PatternKind::Secondary);

    let mut lines = Vec::new();
    if primary > 0 {
        lines.push(format!("Updated total count: {total} (+{primary})"));
    } else if secondary > 0 {
        lines.push(format!(
            "New 'right' matches: +{secondary} (total unchanged at {total})"
        ));
    }
    lines
}

fn count_kind(events: &[MatchEvent], kind: PatternKind) -> usize {
    events.iter().filter(|event| event.matched(kind)).count()
}

fn persist(store: &AggregateStore, state: &AggregateState) -> bool {
    match store.save_state(state) {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, dir = %store.dir().display(), "failed to save counters");
            false
        }
    }
}

fn announce(event: &MatchEvent) {
    println!(
        "[{}] NEW in {} ({} {}): {}",
        Local::now().format("%H:%M:%S"),
        event.project,
        event.date,
        event.time_label(),
        event.excerpt
    );
}

fn touched_days(events: &[MatchEvent]) -> BTreeSet<String> {
    events
        .iter()
        .map(|event| abr_core::day_key(event.date))
        .collect()
}

async fn mirror_days(
    uploader: &UploadClient,
    state: &AggregateState,
    days: &BTreeSet<String>,
    with_right: bool,
) {
    for day in days {
        let right_count = with_right.then(|| state.daily_secondary_count(day));
        uploader
            .upload(day, state.daily_count(day), right_count)
            .await;
    }
}

pub(crate) fn print_patterns(patterns: &PatternSet) {
    if let Some(primary) = patterns.source(PatternKind::Primary) {
        println!("Pattern: {primary}");
    }
    if let Some(secondary) = patterns.source(PatternKind::Secondary) {
        println!("Pattern (right): {secondary}");
    }
}

fn print_projects(heading: &str, state: &AggregateState) {
    if state.projects.is_empty() {
        return;
    }
    println!("{heading}");
    for (project, count) in &state.projects {
        println!("  {project}: {count}");
    }
}
