use abr_core::{
    AggregateState, PatternSet, DEFAULT_PRIMARY_PATTERN, DEFAULT_SECONDARY_PATTERN,
};
use abr_scanner::{backfill_scan, scan_pass};
use abr_storage::AggregateStore;
use chrono::NaiveDate;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn patterns() -> PatternSet {
    PatternSet::new(DEFAULT_PRIMARY_PATTERN, Some(DEFAULT_SECONDARY_PATTERN))
        .expect("default patterns")
}

fn processing_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 20).expect("valid date")
}

fn write_log(dir: &Path, file: &str, lines: &[serde_json::Value]) {
    fs::create_dir_all(dir).expect("create project dir");
    let body = lines
        .iter()
        .map(|line| format!("{line}\n"))
        .collect::<String>();
    fs::write(dir.join(file), body).expect("write log");
}

fn assistant(id: &str, text: &str) -> serde_json::Value {
    json!({
        "type": "assistant",
        "uuid": id,
        "timestamp": "2025-08-18T14:02:11.500Z",
        "message": {"content": [{"type": "text", "text": text}]}
    })
}

fn seed_three_files(root: &Path) {
    let project = root.join("-Users-alice-myproject");
    write_log(&project, "one.jsonl", &[assistant("r-1", "You're absolutely right!")]);
    write_log(&project, "two.jsonl", &[assistant("r-2", "You are right about that.")]);
    write_log(&project, "three.jsonl", &[assistant("r-3", "unrelated text")]);
}

#[test]
fn three_file_scenario_counts_primary_and_secondary_separately() {
    let root = TempDir::new().expect("temp root");
    seed_three_files(root.path());

    let mut state = AggregateState::default();
    let outcome = scan_pass(root.path(), &patterns(), &mut state, processing_day())
        .expect("scan pass");

    assert_eq!(outcome.report.files_scanned, 3);
    assert_eq!(outcome.new_matches.len(), 2);
    assert_eq!(state.total, 1);
    assert_eq!(state.daily_count("2025-08-18"), 1);
    assert_eq!(state.daily_secondary_count("2025-08-18"), 2);
    assert_eq!(state.projects.get("myproject"), Some(&1));
    assert!(state.is_consistent());

    let backfill = backfill_scan(root.path(), &patterns(), processing_day());
    assert_eq!(backfill.tally.primary.get("2025-08-18"), Some(&1));
    assert_eq!(backfill.tally.secondary.get("2025-08-18"), Some(&2));
    assert_eq!(backfill.tally.total_primary(), 1);
}

#[test]
fn restart_does_not_recount_persisted_ids() {
    let root = TempDir::new().expect("temp root");
    let data = TempDir::new().expect("temp data");
    seed_three_files(root.path());

    let store = AggregateStore::open(data.path()).expect("open store");
    let mut state = store.load_state();
    let first = scan_pass(root.path(), &patterns(), &mut state, processing_day())
        .expect("first pass");
    assert_eq!(first.new_matches.len(), 2);
    store.save_state(&state).expect("persist");
    drop(state);

    let restarted = AggregateStore::open(data.path()).expect("reopen store");
    let mut state = restarted.load_state();
    let before = state.clone();
    let second = scan_pass(root.path(), &patterns(), &mut state, processing_day())
        .expect("second pass");

    assert!(second.new_matches.is_empty());
    assert_eq!(state, before);
    assert_eq!(state.total, 1);
}

#[test]
fn appended_records_are_picked_up_incrementally() {
    let root = TempDir::new().expect("temp root");
    let project = root.path().join("plain");
    write_log(&project, "s.jsonl", &[assistant("a-1", "You're absolutely right")]);

    let mut state = AggregateState::default();
    scan_pass(root.path(), &patterns(), &mut state, processing_day()).expect("first pass");

    let no_timestamp = json!({
        "type": "assistant",
        "requestId": "req-2",
        "message": {"content": [
            {"type": "tool_use", "name": "edit"},
            {"type": "text", "text": "you are ABSOLUTELY right, fixing now"}
        ]}
    });
    let user_echo = json!({
        "type": "user",
        "uuid": "u-3",
        "message": {"content": [{"type": "text", "text": "You're absolutely right"}]}
    });
    write_log(
        &project,
        "s.jsonl",
        &[
            assistant("a-1", "You're absolutely right"),
            user_echo,
            no_timestamp,
        ],
    );

    let outcome = scan_pass(root.path(), &patterns(), &mut state, processing_day())
        .expect("second pass");
    assert_eq!(outcome.new_matches.len(), 1);
    assert_eq!(outcome.new_matches[0].record_id, "req-2");
    assert_eq!(outcome.new_matches[0].time_label(), "unknown");
    assert_eq!(state.total, 2);
    assert_eq!(state.daily_count("2025-08-20"), 1);
    assert_eq!(state.projects.get("plain"), Some(&2));
    assert!(state.is_consistent());
}
