//! Query timing and recording
//!
//! [`QueryPerformanceMonitor`] wraps database operations, times them, and feeds
//! the samples to a [`StatisticsAggregator`]. Reports are composed on demand.

pub mod aggregator;
pub mod report;

pub use aggregator::{AggregatorSnapshot, StatisticsAggregator, TARGET_SLOW_RATE};
pub use report::{
    build_report, FrequentOperationEntry, PerformanceExport, PerformanceReport, ReportSummary,
    SlowOperationEntry, SlowQueryEntry, SystemInfo,
};

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    config::MonitorConfig,
    error::MonitorResult,
    events::{EventSink, TracingSink},
    types::{MetricSample, OperationStatistics, QueryParameters, SampleClass},
};

/// Times database operations and keeps their statistics
#[derive(Debug)]
pub struct QueryPerformanceMonitor {
    config: MonitorConfig,
    aggregator: StatisticsAggregator,
    sink: Arc<dyn EventSink>,
}

/// Records a failure sample if the wrapped future is dropped before completing
struct PendingSample<'a> {
    monitor: &'a QueryPerformanceMonitor,
    operation_name: &'a str,
    parameters: Option<QueryParameters>,
    start: Instant,
    completed: bool,
}

impl<'a> PendingSample<'a> {
    fn start(
        monitor: &'a QueryPerformanceMonitor,
        operation_name: &'a str,
        parameters: Option<QueryParameters>,
    ) -> Self {
        Self {
            monitor,
            operation_name,
            parameters,
            start: Instant::now(),
            completed: false,
        }
    }

    fn complete(mut self, success: bool) {
        self.completed = true;
        let parameters = self.parameters.take();
        self.monitor
            .record_sample(self.operation_name, self.start.elapsed(), success, parameters);
    }
}

impl Drop for PendingSample<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.monitor.sink.debug(&format!(
                "Monitored operation cancelled: {}",
                self.operation_name
            ));
            let parameters = self.parameters.take();
            self.monitor
                .record_sample(self.operation_name, self.start.elapsed(), false, parameters);
        }
    }
}

impl QueryPerformanceMonitor {
    /// Create a monitor that logs through `tracing`
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is inconsistent
    pub fn new(config: MonitorConfig) -> MonitorResult<Self> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a monitor with an explicit event sink
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is inconsistent
    pub fn with_sink(config: MonitorConfig, sink: Arc<dyn EventSink>) -> MonitorResult<Self> {
        config.validate()?;

        tracing::info!(
            "Query performance monitor initialized: slow={}ms, warning={}ms, slow_log={}",
            config.slow_threshold_ms,
            config.warning_threshold_ms,
            config.max_slow_query_log_size
        );

        Ok(Self {
            aggregator: StatisticsAggregator::new(&config),
            config,
            sink,
        })
    }

    /// Run `operation`, time it and record the outcome
    ///
    /// The operation's value or error is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns exactly the error produced by `operation`
    pub async fn monitor<F, Fut, T, E>(&self, operation_name: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_monitored(operation_name, None, operation).await
    }

    /// Like [`Self::monitor`], attaching diagnostic parameters to the sample
    ///
    /// # Errors
    ///
    /// Returns exactly the error produced by `operation`
    pub async fn monitor_with_params<F, Fut, T, E>(
        &self,
        operation_name: &str,
        parameters: QueryParameters,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_monitored(operation_name, Some(parameters), operation)
            .await
    }

    async fn run_monitored<F, Fut, T, E>(
        &self,
        operation_name: &str,
        parameters: Option<QueryParameters>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let pending = PendingSample::start(self, operation_name, parameters);
        let outcome = operation().await;
        pending.complete(outcome.is_ok());
        outcome
    }

    /// Record an operation timed by the caller
    pub fn record(&self, operation_name: &str, duration: Duration, success: bool) {
        self.record_sample(operation_name, duration, success, None);
    }

    fn record_sample(
        &self,
        operation_name: &str,
        elapsed: Duration,
        success: bool,
        parameters: Option<QueryParameters>,
    ) {
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let class = self.aggregator.record(MetricSample::new(
            operation_name,
            duration_ms,
            success,
            parameters,
        ));

        #[cfg(feature = "metrics")]
        {
            metrics::histogram!("query_monitor_duration_ms", "operation" => operation_name.to_string())
                .record(crate::cache::u64_to_f64_safe(duration_ms));
            if class == SampleClass::Slow {
                metrics::counter!("query_monitor_slow_queries_total", "operation" => operation_name.to_string())
                    .increment(1);
            }
        }

        match class {
            SampleClass::Slow => self.sink.warn(&format!(
                "Slow query detected: {operation_name} took {duration_ms}ms (threshold {}ms)",
                self.config.slow_threshold_ms
            )),
            SampleClass::ApproachingThreshold => self.sink.info(&format!(
                "Query approaching slow threshold: {operation_name} took {duration_ms}ms (warning at {}ms)",
                self.config.warning_threshold_ms
            )),
            SampleClass::Normal => {}
        }

        if !success {
            self.sink.debug(&format!(
                "Monitored operation failed: {operation_name} after {duration_ms}ms"
            ));
        }
    }

    /// Statistics for one operation, `None` if never observed
    #[must_use]
    pub fn statistics_for(&self, operation_name: &str) -> Option<OperationStatistics> {
        self.aggregator.statistics_for(operation_name)
    }

    /// Statistics for every tracked operation
    #[must_use]
    pub fn all_statistics(&self) -> Vec<OperationStatistics> {
        self.aggregator.all_statistics()
    }

    /// True when the combined slow rate is within target
    #[must_use]
    pub fn is_within_targets(&self) -> bool {
        self.aggregator.is_within_targets()
    }

    /// Compose the current performance report
    #[must_use]
    pub fn get_performance_report(&self) -> PerformanceReport {
        build_report(&self.aggregator.snapshot(), self.config.slow_threshold_ms)
    }

    /// Current report summary only
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        self.get_performance_report().summary
    }

    /// Snapshot for offline diagnostics
    #[must_use]
    pub fn export_snapshot(&self, period: Option<&str>) -> PerformanceExport {
        PerformanceExport {
            timestamp: Utc::now(),
            period: period.map(str::to_string),
            report: self.get_performance_report(),
            system_info: SystemInfo::current(),
        }
    }

    /// Snapshot serialized as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn export_performance_data(&self, period: Option<&str>) -> MonitorResult<String> {
        let export = self.export_snapshot(period);
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Drop all statistics and the slow query log
    pub fn clear(&self) {
        self.aggregator.clear();
        self.sink.info("Query performance data cleared");
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Underlying aggregator
    #[must_use]
    pub const fn aggregator(&self) -> &StatisticsAggregator {
        &self.aggregator
    }
}
