//! Performance report composition and export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::safe_ratio;
use crate::monitor::aggregator::AggregatorSnapshot;
use crate::types::{OperationStatistics, QueryParameters};

/// Entries in the "slowest operations" section
pub const SLOWEST_OPERATIONS_LIMIT: usize = 10;
/// Entries in the "most frequent operations" section
pub const FREQUENT_OPERATIONS_LIMIT: usize = 10;
/// Entries in the "recent slow queries" section
pub const RECENT_SLOW_QUERIES_LIMIT: usize = 20;

/// Storage engine reported in exports
pub const STORAGE_ENGINE: &str = "sqlite";

/// Aggregate totals over every tracked operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    /// Sum of all execution counts
    pub total_queries: u64,
    /// Sum of all slow counts
    pub slow_queries: u64,
    /// Sum of all failed counts
    pub failed_queries: u64,
    /// Successful over total, 0.0 when empty
    pub success_rate: f64,
    /// Slow over total, 0.0 when empty
    pub slow_query_rate: f64,
    /// Cumulative time over total count, 0.0 when empty
    pub avg_execution_time_ms: f64,
    /// Configured slow threshold
    pub target_threshold_ms: u64,
}

/// One row of the slowest operations section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlowOperationEntry {
    /// Operation name
    pub operation: String,
    /// Slowest observed duration
    pub max_time_ms: u64,
    /// Average duration
    pub avg_time_ms: f64,
    /// Total executions
    pub total_executions: u64,
    /// Slow executions
    pub slow_executions: u64,
}

/// One row of the most frequent operations section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrequentOperationEntry {
    /// Operation name
    pub operation: String,
    /// Total executions
    pub total_executions: u64,
    /// Average duration
    pub avg_time_ms: f64,
    /// Fraction of successful executions
    pub success_rate: f64,
}

/// One row of the recent slow queries section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlowQueryEntry {
    /// Operation name
    pub operation: String,
    /// Measured duration
    pub duration_ms: u64,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Diagnostic parameters
    pub parameters: Option<QueryParameters>,
}

/// Point-in-time performance report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReport {
    /// When the report was composed
    pub generated_at: DateTime<Utc>,
    /// Totals
    pub summary: ReportSummary,
    /// Top operations by maximum duration
    pub slowest_queries: Vec<SlowOperationEntry>,
    /// Top operations by execution count
    pub most_frequent_queries: Vec<FrequentOperationEntry>,
    /// Latest slow samples, newest first
    pub recent_slow_queries: Vec<SlowQueryEntry>,
}

/// Static metadata attached to exports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemInfo {
    /// Host platform
    pub platform: String,
    /// Storage engine identifier
    pub storage_engine: String,
    /// Version of this crate
    pub monitor_version: String,
}

impl SystemInfo {
    /// Metadata for the running process
    #[must_use]
    pub fn current() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            storage_engine: STORAGE_ENGINE.to_string(),
            monitor_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Diagnostic snapshot for offline analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceExport {
    /// Export time
    pub timestamp: DateTime<Utc>,
    /// Period requested by the caller
    pub period: Option<String>,
    /// Full report
    pub report: PerformanceReport,
    /// Platform and version metadata
    pub system_info: SystemInfo,
}

/// Compose a report from an aggregator snapshot
#[must_use]
pub fn build_report(snapshot: &AggregatorSnapshot, target_threshold_ms: u64) -> PerformanceReport {
    let statistics = &snapshot.statistics;

    let mut total_queries = 0_u64;
    let mut slow_queries = 0_u64;
    let mut failed_queries = 0_u64;
    let mut total_time_ms = 0_u64;
    for stats in statistics {
        total_queries = total_queries.saturating_add(stats.total_executions);
        slow_queries = slow_queries.saturating_add(stats.slow_executions);
        failed_queries = failed_queries.saturating_add(stats.failed_executions());
        total_time_ms = total_time_ms.saturating_add(stats.total_time_ms);
    }

    let summary = ReportSummary {
        total_queries,
        slow_queries,
        failed_queries,
        success_rate: safe_ratio(total_queries.saturating_sub(failed_queries), total_queries),
        slow_query_rate: safe_ratio(slow_queries, total_queries),
        avg_execution_time_ms: safe_ratio(total_time_ms, total_queries),
        target_threshold_ms,
    };

    // Stable sorts keep first-observed order among ties
    let mut by_max: Vec<&OperationStatistics> = statistics.iter().collect();
    by_max.sort_by(|a, b| b.max_time_ms.cmp(&a.max_time_ms));
    let slowest_queries = by_max
        .into_iter()
        .take(SLOWEST_OPERATIONS_LIMIT)
        .map(|stats| SlowOperationEntry {
            operation: stats.operation_name.clone(),
            max_time_ms: stats.max_time_ms,
            avg_time_ms: stats.average_time_ms(),
            total_executions: stats.total_executions,
            slow_executions: stats.slow_executions,
        })
        .collect();

    let mut by_count: Vec<&OperationStatistics> = statistics.iter().collect();
    by_count.sort_by(|a, b| b.total_executions.cmp(&a.total_executions));
    let most_frequent_queries = by_count
        .into_iter()
        .take(FREQUENT_OPERATIONS_LIMIT)
        .map(|stats| FrequentOperationEntry {
            operation: stats.operation_name.clone(),
            total_executions: stats.total_executions,
            avg_time_ms: stats.average_time_ms(),
            success_rate: stats.success_rate(),
        })
        .collect();

    let recent_slow_queries = snapshot
        .slow_log
        .iter()
        .rev()
        .take(RECENT_SLOW_QUERIES_LIMIT)
        .map(|sample| SlowQueryEntry {
            operation: sample.operation_name.clone(),
            duration_ms: sample.duration_ms,
            timestamp: sample.timestamp,
            parameters: sample.parameters.clone(),
        })
        .collect();

    PerformanceReport {
        generated_at: Utc::now(),
        summary,
        slowest_queries,
        most_frequent_queries,
        recent_slow_queries,
    }
}
