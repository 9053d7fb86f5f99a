//! Filter pipeline - Narrows the process list for display without re-fetching

use serde::{Deserialize, Serialize};

use super::resource::ProcessRecord;

/// Category predicate applied on top of the text query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessFilter {
    #[default]
    All,
    HighCpu,
    HighMemory,
}

impl ProcessFilter {
    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::HighCpu => "High CPU",
            Self::HighMemory => "High Memory",
        }
    }

    pub fn all() -> &'static [ProcessFilter] {
        &[
            ProcessFilter::All,
            ProcessFilter::HighCpu,
            ProcessFilter::HighMemory,
        ]
    }

    fn passes(&self, process: &ProcessRecord, thresholds: &Thresholds) -> bool {
        match self {
            Self::All => true,
            Self::HighCpu => process.cpu_usage > thresholds.cpu_percent,
            Self::HighMemory => process.memory > thresholds.memory_bytes,
        }
    }
}

/// Cut-off values for the category predicates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 5.0,
            memory_bytes: 100 * 1024 * 1024,
        }
    }
}

/// What the operator is currently searching for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub query: String,
    pub filter: ProcessFilter,
}

impl FilterState {
    pub fn new(query: impl Into<String>, filter: ProcessFilter) -> Self {
        Self {
            query: query.into(),
            filter,
        }
    }

    /// Text and category match, conjunctively
    pub fn matches(&self, process: &ProcessRecord, thresholds: &Thresholds) -> bool {
        self.filter.passes(process, thresholds) && matches_query(process, &self.query)
    }
}

fn matches_query(process: &ProcessRecord, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    process.name.to_lowercase().contains(&query.to_lowercase())
        || process.pid.to_string().contains(query)
}

/// Displayed subset of the process list
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilteredView {
    /// Matching processes in backend order, at most `cap` of them
    pub rows: Vec<ProcessRecord>,
    /// Number of processes that matched before the cap was applied
    pub total_matches: usize,
}

impl FilteredView {
    pub fn is_truncated(&self) -> bool {
        self.total_matches > self.rows.len()
    }
}

/// Apply the filter to a process list, keeping backend order
pub fn apply(
    processes: &[ProcessRecord],
    state: &FilterState,
    thresholds: &Thresholds,
    cap: usize,
) -> FilteredView {
    let mut rows = Vec::new();
    let mut total_matches = 0;
    for process in processes.iter().filter(|p| state.matches(p, thresholds)) {
        total_matches += 1;
        if rows.len() < cap {
            rows.push(process.clone());
        }
    }
    FilteredView {
        rows,
        total_matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::ProcessState;

    fn process(pid: u32, name: &str, cpu_usage: f32, memory: u64) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.to_string(),
            cpu_usage,
            memory,
            status: ProcessState::Running,
        }
    }

    fn fixture() -> Vec<ProcessRecord> {
        vec![
            process(4312, "Firefox", 22.5, 900 * 1024 * 1024),
            process(77, "postgres", 6.0, 40 * 1024 * 1024),
            process(1, "init", 0.0, 8 * 1024 * 1024),
            process(981, "node", 0.4, 300 * 1024 * 1024),
        ]
    }

    fn view(processes: &[ProcessRecord], query: &str, filter: ProcessFilter) -> Vec<u32> {
        apply(
            processes,
            &FilterState::new(query, filter),
            &Thresholds::default(),
            100,
        )
        .rows
        .iter()
        .map(|p| p.pid)
        .collect()
    }

    #[test]
    fn empty_input_gives_empty_view() {
        assert!(view(&[], "", ProcessFilter::All).is_empty());
    }

    #[test]
    fn no_filter_is_identity_in_order() {
        let processes = fixture();
        let result = apply(
            &processes,
            &FilterState::default(),
            &Thresholds::default(),
            100,
        );
        assert_eq!(result.rows, processes);
        assert_eq!(result.total_matches, processes.len());
    }

    #[test]
    fn query_matches_name_case_insensitively() {
        assert_eq!(view(&fixture(), "FIRE", ProcessFilter::All), vec![4312]);
        assert_eq!(view(&fixture(), "  node ", ProcessFilter::All), vec![981]);
    }

    #[test]
    fn query_matches_pid_text() {
        assert_eq!(view(&fixture(), "77", ProcessFilter::All), vec![77]);
        assert_eq!(view(&fixture(), "1", ProcessFilter::All), vec![4312, 1, 981]);
    }

    #[test]
    fn predicates_use_strict_thresholds() {
        assert_eq!(view(&fixture(), "", ProcessFilter::HighCpu), vec![4312, 77]);
        assert_eq!(view(&fixture(), "", ProcessFilter::HighMemory), vec![4312, 981]);

        let at_threshold = vec![process(5, "edge", 5.0, 100 * 1024 * 1024)];
        assert!(view(&at_threshold, "", ProcessFilter::HighCpu).is_empty());
        assert!(view(&at_threshold, "", ProcessFilter::HighMemory).is_empty());
    }

    #[test]
    fn query_and_predicate_are_conjunctive() {
        assert_eq!(view(&fixture(), "o", ProcessFilter::HighCpu), vec![4312, 77]);
        assert!(view(&fixture(), "node", ProcessFilter::HighCpu).is_empty());
    }

    #[test]
    fn result_is_always_a_subset() {
        let processes = fixture();
        for query in ["", "o", "4", "zzz", "INIT"] {
            for filter in ProcessFilter::all() {
                let result = apply(
                    &processes,
                    &FilterState::new(query, *filter),
                    &Thresholds::default(),
                    100,
                );
                assert!(result.rows.iter().all(|p| processes.contains(p)));
                assert!(result.rows.len() <= processes.len());
            }
        }
    }

    #[test]
    fn cap_limits_rows_but_keeps_true_count() {
        let processes: Vec<_> = (0..250).map(|i| process(i, "worker", 1.0, 0)).collect();
        let result = apply(
            &processes,
            &FilterState::new("worker", ProcessFilter::All),
            &Thresholds::default(),
            100,
        );
        assert_eq!(result.rows.len(), 100);
        assert_eq!(result.total_matches, 250);
        assert!(result.is_truncated());
        assert_eq!(result.rows[0].pid, 0);
        assert_eq!(result.rows[99].pid, 99);
    }

    #[test]
    fn single_process_scenario() {
        let processes = vec![ProcessRecord {
            pid: 1,
            name: "a".to_string(),
            cpu_usage: 2.0,
            memory: 1000,
            status: ProcessState::Running,
        }];
        assert_eq!(view(&processes, "a", ProcessFilter::All), vec![1]);
        assert!(view(&processes, "a", ProcessFilter::HighCpu).is_empty());
    }
}
