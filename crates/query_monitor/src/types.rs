//! Query Monitor Types
//!
//! Samples and running statistics for monitored database operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cache::safe_ratio;

/// Free-form diagnostic context attached to a sample
pub type QueryParameters = HashMap<String, serde_json::Value>;

/// One observation of a single operation execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    /// Logical operation name
    pub operation_name: String,

    /// Measured duration in milliseconds
    pub duration_ms: u64,

    /// When the operation completed
    pub timestamp: DateTime<Utc>,

    /// Whether the wrapped operation succeeded
    pub success: bool,

    /// Optional diagnostic parameters
    pub parameters: Option<QueryParameters>,
}

impl MetricSample {
    /// Create a sample stamped with the current time
    #[must_use]
    pub fn new(
        operation_name: impl Into<String>,
        duration_ms: u64,
        success: bool,
        parameters: Option<QueryParameters>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            duration_ms,
            timestamp: Utc::now(),
            success,
            parameters,
        }
    }
}

/// How a sample compares against the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleClass {
    /// At or below the warning watermark
    Normal,
    /// Above the warning watermark, at or below the slow threshold
    ApproachingThreshold,
    /// Above the slow threshold
    Slow,
}

impl SampleClass {
    /// Classify a duration
    #[must_use]
    pub const fn classify(duration_ms: u64, warning_threshold_ms: u64, slow_threshold_ms: u64) -> Self {
        if duration_ms > slow_threshold_ms {
            Self::Slow
        } else if duration_ms > warning_threshold_ms {
            Self::ApproachingThreshold
        } else {
            Self::Normal
        }
    }
}

/// Running aggregate for one named operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationStatistics {
    /// Operation name
    pub operation_name: String,

    /// Total executions
    pub total_executions: u64,

    /// Executions whose operation succeeded
    pub successful_executions: u64,

    /// Executions slower than the slow threshold
    pub slow_executions: u64,

    /// Cumulative duration in milliseconds
    pub total_time_ms: u64,

    /// Fastest observed duration in milliseconds
    pub min_time_ms: u64,

    /// Slowest observed duration in milliseconds
    pub max_time_ms: u64,

    /// Timestamp of the latest execution
    pub last_executed: DateTime<Utc>,
}

impl OperationStatistics {
    /// Seed statistics from the first observed sample
    pub(crate) fn first(operation_name: &str, duration_ms: u64, success: bool, slow: bool) -> Self {
        Self {
            operation_name: operation_name.to_string(),
            total_executions: 1,
            successful_executions: u64::from(success),
            slow_executions: u64::from(slow),
            total_time_ms: duration_ms,
            min_time_ms: duration_ms,
            max_time_ms: duration_ms,
            last_executed: Utc::now(),
        }
    }

    /// Fold another sample into the aggregate
    pub(crate) fn observe(&mut self, duration_ms: u64, success: bool, slow: bool) {
        self.total_executions = self.total_executions.saturating_add(1);
        if success {
            self.successful_executions = self.successful_executions.saturating_add(1);
        }
        if slow {
            self.slow_executions = self.slow_executions.saturating_add(1);
        }
        self.total_time_ms = self.total_time_ms.saturating_add(duration_ms);
        if duration_ms < self.min_time_ms {
            self.min_time_ms = duration_ms;
        }
        if duration_ms > self.max_time_ms {
            self.max_time_ms = duration_ms;
        }
        self.last_executed = Utc::now();
    }

    /// Average duration in milliseconds
    #[must_use]
    pub fn average_time_ms(&self) -> f64 {
        safe_ratio(self.total_time_ms, self.total_executions)
    }

    /// Fraction of executions that succeeded
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        safe_ratio(self.successful_executions, self.total_executions)
    }

    /// Fraction of executions that were slow
    #[must_use]
    pub fn slow_rate(&self) -> f64 {
        safe_ratio(self.slow_executions, self.total_executions)
    }

    /// Executions whose operation failed
    #[must_use]
    pub const fn failed_executions(&self) -> u64 {
        self.total_executions.saturating_sub(self.successful_executions)
    }
}
