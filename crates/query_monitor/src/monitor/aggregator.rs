//! Statistics aggregator
//!
//! Per-operation running statistics plus the bounded slow query log. Both live
//! behind one lock so a record or a clear is observed as a single step.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::cache::safe_ratio;
use crate::config::MonitorConfig;
use crate::types::{MetricSample, OperationStatistics, SampleClass};

/// Global slow rate allowed by [`StatisticsAggregator::is_within_targets`]
pub const TARGET_SLOW_RATE: f64 = 0.05;

#[derive(Debug, Default)]
struct AggregatorState {
    /// Statistics in first-observed order
    statistics: Vec<OperationStatistics>,
    /// Operation name to position in `statistics`
    index: HashMap<String, usize>,
    /// Slow samples, oldest first
    slow_log: VecDeque<MetricSample>,
}

impl AggregatorState {
    fn update(&mut self, operation_name: &str, duration_ms: u64, success: bool, slow: bool) {
        if let Some(&position) = self.index.get(operation_name) {
            if let Some(stats) = self.statistics.get_mut(position) {
                stats.observe(duration_ms, success, slow);
            }
        } else {
            self.index
                .insert(operation_name.to_string(), self.statistics.len());
            self.statistics.push(OperationStatistics::first(
                operation_name,
                duration_ms,
                success,
                slow,
            ));
        }
    }

    fn push_slow(&mut self, sample: MetricSample, capacity: usize) {
        self.slow_log.push_back(sample);
        while self.slow_log.len() > capacity {
            self.slow_log.pop_front();
        }
    }
}

/// Point-in-time copy of the aggregator state
#[derive(Debug, Clone, Default)]
pub struct AggregatorSnapshot {
    /// Statistics in first-observed order
    pub statistics: Vec<OperationStatistics>,
    /// Slow samples, oldest first
    pub slow_log: Vec<MetricSample>,
}

/// Running per-operation statistics
#[derive(Debug)]
pub struct StatisticsAggregator {
    slow_threshold_ms: u64,
    warning_threshold_ms: u64,
    max_slow_query_log_size: usize,
    state: Mutex<AggregatorState>,
}

impl StatisticsAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            slow_threshold_ms: config.slow_threshold_ms,
            warning_threshold_ms: config.warning_threshold_ms,
            max_slow_query_log_size: config.max_slow_query_log_size.max(1),
            state: Mutex::new(AggregatorState::default()),
        }
    }

    /// Fold one observation into the statistics for `operation_name`
    pub fn update(&self, operation_name: &str, duration_ms: u64, success: bool) {
        let slow = duration_ms > self.slow_threshold_ms;
        self.state
            .lock()
            .update(operation_name, duration_ms, success, slow);
    }

    /// Record a sample: statistics update and, if slow, a slow log append
    pub fn record(&self, sample: MetricSample) -> SampleClass {
        let class = SampleClass::classify(
            sample.duration_ms,
            self.warning_threshold_ms,
            self.slow_threshold_ms,
        );
        let slow = class == SampleClass::Slow;

        let mut state = self.state.lock();
        state.update(&sample.operation_name, sample.duration_ms, sample.success, slow);
        if slow {
            state.push_slow(sample, self.max_slow_query_log_size);
        }
        class
    }

    /// Statistics for one operation, `None` if never observed
    #[must_use]
    pub fn statistics_for(&self, operation_name: &str) -> Option<OperationStatistics> {
        let state = self.state.lock();
        state
            .index
            .get(operation_name)
            .and_then(|&position| state.statistics.get(position))
            .cloned()
    }

    /// Statistics for every tracked operation
    #[must_use]
    pub fn all_statistics(&self) -> Vec<OperationStatistics> {
        self.state.lock().statistics.clone()
    }

    /// Most recent slow samples, newest first
    #[must_use]
    pub fn recent_slow_queries(&self, limit: usize) -> Vec<MetricSample> {
        self.state
            .lock()
            .slow_log
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Current slow query log length
    #[must_use]
    pub fn slow_query_log_len(&self) -> usize {
        self.state.lock().slow_log.len()
    }

    /// True when the combined slow rate of all operations is at most 5%
    #[must_use]
    pub fn is_within_targets(&self) -> bool {
        let state = self.state.lock();
        let (total, slow) = state
            .statistics
            .iter()
            .fold((0_u64, 0_u64), |(total, slow), stats| {
                (
                    total.saturating_add(stats.total_executions),
                    slow.saturating_add(stats.slow_executions),
                )
            });

        if total == 0 {
            return true;
        }
        safe_ratio(slow, total) <= TARGET_SLOW_RATE
    }

    /// Copy statistics and slow log under one lock acquisition
    #[must_use]
    pub fn snapshot(&self) -> AggregatorSnapshot {
        let state = self.state.lock();
        AggregatorSnapshot {
            statistics: state.statistics.clone(),
            slow_log: state.slow_log.iter().cloned().collect(),
        }
    }

    /// Drop all statistics and the slow log
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = AggregatorState::default();
    }

    /// Configured slow threshold
    #[must_use]
    pub const fn slow_threshold_ms(&self) -> u64 {
        self.slow_threshold_ms
    }
}
