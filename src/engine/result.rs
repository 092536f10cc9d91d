// ABOUTME: Execution result classification and per-run report aggregation
// ABOUTME: One result per completed node plus summary counts for the whole run

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::TestError;

/// Outcome of one node's invocation: exactly one variant per completed node.
/// A node that never completes has no result at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionResult {
    Successful,
    Aborted { cause: TestError },
    Failed { cause: TestError },
}

impl ExecutionResult {
    pub fn successful() -> Self {
        Self::Successful
    }

    pub fn aborted(cause: TestError) -> Self {
        Self::Aborted { cause }
    }

    pub fn failed(cause: TestError) -> Self {
        Self::Failed { cause }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Successful)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn cause(&self) -> Option<&TestError> {
        match self {
            Self::Successful => None,
            Self::Aborted { cause } | Self::Failed { cause } => Some(cause),
        }
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Successful => write!(f, "successful"),
            Self::Aborted { .. } => write!(f, "aborted"),
            Self::Failed { .. } => write!(f, "failed"),
        }
    }
}

/// Report entry for one executed node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    pub node_id: String,
    pub display_name: String,
    pub result: ExecutionResult,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Context-close failure, surfaced separately from the node's own result.
    pub teardown_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_nodes: usize,
    pub successful: usize,
    pub aborted: usize,
    pub failed: usize,
    pub teardown_errors: usize,
}

/// Aggregated results for one execution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entries: Vec<NodeReport>,
    pub summary: ReportSummary,
}

impl ExecutionReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    pub(crate) fn record(&mut self, entry: NodeReport) {
        self.entries.push(entry);
        self.update_summary();
    }

    pub(crate) fn record_teardown_error(&mut self, node_id: &str, message: String) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.node_id == node_id) {
            entry.teardown_error = Some(message);
        }
        self.update_summary();
    }

    pub(crate) fn mark_completed(&mut self) {
        self.finished_at = Some(Utc::now());
        self.update_summary();
    }

    pub fn entry(&self, node_id: &str) -> Option<&NodeReport> {
        self.entries.iter().find(|e| e.node_id == node_id)
    }

    pub fn result(&self, node_id: &str) -> Option<&ExecutionResult> {
        self.entry(node_id).map(|e| &e.result)
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.result.is_failed())
    }

    fn update_summary(&mut self) {
        self.summary = ReportSummary {
            total_nodes: self.entries.len(),
            successful: self.entries.iter().filter(|e| e.result.is_successful()).count(),
            aborted: self.entries.iter().filter(|e| e.result.is_aborted()).count(),
            failed: self.entries.iter().filter(|e| e.result.is_failed()).count(),
            teardown_errors: self
                .entries
                .iter()
                .filter(|e| e.teardown_error.is_some())
                .count(),
        };
    }
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node_id: &str, result: ExecutionResult) -> NodeReport {
        NodeReport {
            node_id: node_id.to_string(),
            display_name: node_id.to_string(),
            result,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(1),
            teardown_error: None,
        }
    }

    #[test]
    fn summary_rolls_up_per_node_results() {
        let mut report = ExecutionReport::new();
        report.record(entry("a", ExecutionResult::successful()));
        report.record(entry(
            "b",
            ExecutionResult::failed(TestError::failed("boom")),
        ));
        report.record(entry(
            "c",
            ExecutionResult::aborted(TestError::aborted("precondition")),
        ));
        report.mark_completed();

        assert_eq!(report.summary.total_nodes, 3);
        assert_eq!(report.summary.successful, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.aborted, 1);
        assert!(report.has_failures());
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn teardown_errors_do_not_change_the_node_result() {
        let mut report = ExecutionReport::new();
        report.record(entry("a", ExecutionResult::successful()));
        report.record_teardown_error("a", "resource refused to close".to_string());

        let entry = report.entry("a").unwrap();
        assert!(entry.result.is_successful());
        assert!(entry.teardown_error.is_some());
        assert_eq!(report.summary.teardown_errors, 1);
    }
}
