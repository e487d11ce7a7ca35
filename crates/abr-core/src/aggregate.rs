use crate::day_key;
use crate::matcher::{MatchEvent, PatternKind};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Durable counters maintained by the watcher.
///
/// `processed_ids` is the only idempotency guard: an id in the set has
/// already contributed to every counter it ever will.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    pub total: u64,
    pub daily: BTreeMap<String, u64>,
    pub daily_secondary: BTreeMap<String, u64>,
    pub projects: BTreeMap<String, u64>,
    pub processed_ids: HashSet<String>,
}

impl AggregateState {
    pub fn is_processed(&self, record_id: &str) -> bool {
        self.processed_ids.contains(record_id)
    }

    /// Applies one match exactly once. Returns `false` when the record was
    /// already counted.
    pub fn apply_match(&mut self, event: &MatchEvent) -> bool {
        if !self.processed_ids.insert(event.record_id.clone()) {
            return false;
        }

        let day = day_key(event.date);
        if event.matched(PatternKind::Primary) {
            self.total += 1;
            *self.daily.entry(day.clone()).or_insert(0) += 1;
            *self.projects.entry(event.project.clone()).or_insert(0) += 1;
        }
        if event.matched(PatternKind::Secondary) {
            *self.daily_secondary.entry(day).or_insert(0) += 1;
        }
        true
    }

    /// `total` agrees with both the daily and the per-project breakdown.
    pub fn is_consistent(&self) -> bool {
        self.total == self.daily.values().sum::<u64>()
            && self.total == self.projects.values().sum::<u64>()
    }

    pub fn daily_count(&self, day: &str) -> u64 {
        self.daily.get(day).copied().unwrap_or(0)
    }

    pub fn daily_secondary_count(&self, day: &str) -> u64 {
        self.daily_secondary.get(day).copied().unwrap_or(0)
    }
}

/// Day-level counts recomputed from scratch by a full backfill scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyTally {
    pub primary: BTreeMap<String, u64>,
    pub secondary: BTreeMap<String, u64>,
    /// Primary matches per day, broken down by project label.
    pub by_date: BTreeMap<String, BTreeMap<String, u64>>,
}

impl DailyTally {
    pub fn record(&mut self, event: &MatchEvent) {
        let day = day_key(event.date);
        if event.matched(PatternKind::Primary) {
            *self.primary.entry(day.clone()).or_insert(0) += 1;
            *self
                .by_date
                .entry(day.clone())
                .or_default()
                .entry(event.project.clone())
                .or_insert(0) += 1;
        }
        if event.matched(PatternKind::Secondary) {
            *self.secondary.entry(day).or_insert(0) += 1;
        }
    }

    pub fn total_primary(&self) -> u64 {
        self.primary.values().sum()
    }

    pub fn total_secondary(&self) -> u64 {
        self.secondary.values().sum()
    }

    /// Every day with at least one primary or secondary match, ascending.
    pub fn days(&self) -> BTreeSet<String> {
        self.primary
            .keys()
            .chain(self.secondary.keys())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(id: &str, day: u32, project: &str, kinds: &[PatternKind]) -> MatchEvent {
        MatchEvent {
            record_id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, day).expect("valid date"),
            time: None,
            project: project.to_string(),
            matched: kinds.iter().copied().collect(),
            excerpt: String::new(),
        }
    }

    #[test]
    fn applying_the_same_id_twice_counts_once() {
        let mut state = AggregateState::default();
        let hit = event("a", 1, "alpha", &[PatternKind::Primary, PatternKind::Secondary]);

        assert!(state.apply_match(&hit));
        let after_first = state.clone();
        assert!(!state.apply_match(&hit));

        assert_eq!(state, after_first);
        assert_eq!(state.total, 1);
        assert_eq!(state.daily_count("2025-06-01"), 1);
        assert_eq!(state.daily_secondary_count("2025-06-01"), 1);
        assert_eq!(state.projects.get("alpha"), Some(&1));
    }

    #[test]
    fn secondary_only_feeds_its_daily_counter() {
        let mut state = AggregateState::default();
        assert!(state.apply_match(&event("b", 2, "alpha", &[PatternKind::Secondary])));

        assert_eq!(state.total, 0);
        assert!(state.daily.is_empty());
        assert!(state.projects.is_empty());
        assert_eq!(state.daily_secondary_count("2025-06-02"), 1);
        assert!(state.is_processed("b"));
    }

    #[test]
    fn totals_stay_consistent_across_mixed_matches() {
        let mut state = AggregateState::default();
        let events = [
            event("1", 1, "alpha", &[PatternKind::Primary, PatternKind::Secondary]),
            event("2", 1, "beta", &[PatternKind::Primary]),
            event("3", 2, "alpha", &[PatternKind::Secondary]),
            event("4", 3, "beta", &[PatternKind::Primary, PatternKind::Secondary]),
            event("2", 3, "gamma", &[PatternKind::Primary]),
        ];
        for event in &events {
            state.apply_match(event);
            assert!(state.is_consistent());
        }

        assert_eq!(state.total, 3);
        assert_eq!(state.daily_secondary.values().sum::<u64>(), 3);
        assert!(!state.projects.contains_key("gamma"));
    }

    #[test]
    fn tally_counts_days_without_dedup() {
        let mut tally = DailyTally::default();
        tally.record(&event("x", 1, "alpha", &[PatternKind::Primary, PatternKind::Secondary]));
        tally.record(&event("y", 1, "beta", &[PatternKind::Primary]));
        tally.record(&event("z", 4, "alpha", &[PatternKind::Secondary]));

        assert_eq!(tally.total_primary(), 2);
        assert_eq!(tally.total_secondary(), 2);
        assert_eq!(
            tally.days().into_iter().collect::<Vec<_>>(),
            vec!["2025-06-01".to_string(), "2025-06-04".to_string()]
        );
        let first_day = tally.by_date.get("2025-06-01").expect("breakdown");
        assert_eq!(first_day.get("alpha"), Some(&1));
        assert_eq!(first_day.get("beta"), Some(&1));
        assert!(!tally.by_date.contains_key("2025-06-04"));
    }
}
