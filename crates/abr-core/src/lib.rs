pub mod aggregate;
pub mod matcher;
pub mod record;

pub use aggregate::{AggregateState, DailyTally};
pub use matcher::{
    MatchEvent, PatternError, PatternKind, PatternSet, DEFAULT_PRIMARY_PATTERN,
    DEFAULT_SECONDARY_PATTERN,
};
pub use record::LogRecord;

use chrono::NaiveDate;

/// Directory-name prefixes produced when an absolute path is flattened into a
/// single project directory name (`/Users/alice/foo` -> `-Users-alice-foo`).
pub const ENCODED_PATH_PREFIXES: [&str; 3] = ["-Users-", "-home-", "-var-"];

/// Display label for a project directory.
///
/// Encoded home-style paths lose their leading `-<root>-<user>-` part; any
/// other name is returned unchanged. Labels are cosmetic, so two directories
/// that collapse to the same label are counted together.
pub fn project_label(dir_name: &str) -> String {
    if ENCODED_PATH_PREFIXES
        .iter()
        .any(|prefix| dir_name.starts_with(prefix))
    {
        if let Some(rest) = dir_name.splitn(4, '-').nth(3) {
            return rest.to_string();
        }
    }
    dir_name.to_string()
}

/// Storage key for a calendar day (`YYYY-MM-DD`).
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
