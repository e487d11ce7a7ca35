use crate::record::LogRecord;
use chrono::{NaiveDate, NaiveTime};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_PRIMARY_PATTERN: &str = r"You(?:'re| are) absolutely right";
pub const DEFAULT_SECONDARY_PATTERN: &str = r"You(?:'re| are) (?:absolutely )?right";

const EXCERPT_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid {kind} pattern {pattern:?}: {source}")]
    Invalid {
        kind: PatternKind,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Which counter family a pattern feeds.
///
/// `Primary` drives the running total, the daily counts and the per-project
/// leaderboard. `Secondary` is only tracked per day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Primary,
    Secondary,
}

impl PatternKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of testing one record against the pattern set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub record_id: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub project: String,
    pub matched: BTreeSet<PatternKind>,
    pub excerpt: String,
}

impl MatchEvent {
    pub fn matched(&self, kind: PatternKind) -> bool {
        self.matched.contains(&kind)
    }

    pub fn time_label(&self) -> String {
        self.time
            .map(|time| time.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Named, case-insensitive patterns evaluated independently of each other.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<(PatternKind, Regex)>,
}

impl PatternSet {
    pub fn new(primary: &str, secondary: Option<&str>) -> Result<Self, PatternError> {
        let mut patterns = vec![(PatternKind::Primary, compile(PatternKind::Primary, primary)?)];
        if let Some(secondary) = secondary {
            patterns.push((
                PatternKind::Secondary,
                compile(PatternKind::Secondary, secondary)?,
            ));
        }
        Ok(Self { patterns })
    }

    pub fn source(&self, kind: PatternKind) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, regex)| regex.as_str())
    }

    /// Every pattern that occurs anywhere in `text`. Overlapping patterns
    /// all report.
    pub fn matches(&self, text: &str) -> BTreeSet<PatternKind> {
        self.patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Builds the match event for `record`, or `None` if no pattern hit.
    pub fn evaluate(
        &self,
        record: &LogRecord,
        project: &str,
        fallback_date: NaiveDate,
    ) -> Option<MatchEvent> {
        let matched = self.matches(&record.text());
        if matched.is_empty() {
            return None;
        }

        let excerpt_source = record
            .text_segments
            .iter()
            .find(|segment| {
                self.patterns
                    .iter()
                    .any(|(kind, regex)| matched.contains(kind) && regex.is_match(segment))
            })
            .cloned()
            .unwrap_or_else(|| record.text());

        Some(MatchEvent {
            record_id: record.id.clone(),
            date: record.date_or(fallback_date),
            time: record.time(),
            project: project.to_string(),
            matched,
            excerpt: excerpt_source.trim().chars().take(EXCERPT_CHARS).collect(),
        })
    }
}

fn compile(kind: PatternKind, pattern: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::Invalid {
            kind,
            pattern: pattern.to_string(),
            source,
        })
}
