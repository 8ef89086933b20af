//! Performance dashboard
//!
//! Combines query statistics from the [`QueryPerformanceMonitor`] with cache
//! statistics from the external cache strategy, classifies overall health, and
//! runs a periodic check that can trigger best-effort cache optimization.

pub mod health;

pub use health::{
    classify, optimization_recommendations, HealthStatus, HealthTier, QueryHealthInput,
    OPTIMAL_PERFORMANCE_MESSAGE,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::{
    cache::{CacheStatistics, CacheStatsProvider},
    config::MonitorConfig,
    error::MonitorResult,
    events::{EventSink, TracingSink},
    monitor::{QueryPerformanceMonitor, ReportSummary},
};

/// Current view of query and cache health
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardSnapshot {
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
    /// Query totals
    pub query_summary: ReportSummary,
    /// Cache statistics reported by the cache strategy
    pub cache_statistics: CacheStatistics,
    /// Health classification
    pub health: HealthStatus,
    /// Ordered recommendations
    pub recommendations: Vec<String>,
    /// Global slow rate within target
    pub within_targets: bool,
}

/// What the auto-optimization step did during a health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoOptimization {
    /// Hit ratio at or above the auto-optimization threshold
    NotNeeded,
    /// Cache optimization ran
    Triggered,
    /// Cache optimization failed; the failure was logged and absorbed
    Failed(String),
}

/// Result of one health check cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckOutcome {
    /// Health view the decision was based on
    pub snapshot: DashboardSnapshot,
    /// Auto-optimization result
    pub auto_optimization: AutoOptimization,
}

/// Health dashboard over the query monitor and cache strategy
pub struct PerformanceDashboard {
    monitor: Arc<QueryPerformanceMonitor>,
    cache_provider: Arc<dyn CacheStatsProvider>,
    config: MonitorConfig,
    sink: Arc<dyn EventSink>,
    last_check: parking_lot::RwLock<Option<HealthCheckOutcome>>,
    check_task: parking_lot::Mutex<Option<CheckTask>>,
}

/// Running periodic task with its own shutdown signal
struct CheckTask {
    handle: tokio::task::JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for PerformanceDashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceDashboard")
            .field("config", &self.config)
            .field("monitoring", &self.is_monitoring())
            .finish_non_exhaustive()
    }
}

impl PerformanceDashboard {
    /// Create a dashboard that logs through `tracing`
    #[must_use]
    pub fn new(
        monitor: Arc<QueryPerformanceMonitor>,
        cache_provider: Arc<dyn CacheStatsProvider>,
    ) -> Self {
        Self::with_sink(monitor, cache_provider, Arc::new(TracingSink))
    }

    /// Create a dashboard with an explicit event sink
    #[must_use]
    pub fn with_sink(
        monitor: Arc<QueryPerformanceMonitor>,
        cache_provider: Arc<dyn CacheStatsProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let config = monitor.config().clone();
        tracing::info!(
            "Performance dashboard initialized: check interval {:?}, auto-optimize below {:.0}% hit ratio",
            config.check_interval,
            config.auto_optimize_hit_ratio_threshold * 100.0
        );

        Self {
            monitor,
            cache_provider,
            config,
            sink,
            last_check: parking_lot::RwLock::new(None),
            check_task: parking_lot::Mutex::new(None),
        }
    }

    /// Compose the current health view without side effects
    ///
    /// # Errors
    ///
    /// Returns error if the cache strategy cannot report statistics
    pub async fn dashboard_snapshot(&self) -> MonitorResult<DashboardSnapshot> {
        let cache_statistics = self.cache_provider.get_cache_statistics().await?;
        let query_summary = self.monitor.summary();
        let query = QueryHealthInput::from(&query_summary);

        Ok(DashboardSnapshot {
            generated_at: Utc::now(),
            health: classify(&query, &cache_statistics),
            recommendations: optimization_recommendations(&query, &cache_statistics),
            within_targets: self.monitor.is_within_targets(),
            query_summary,
            cache_statistics,
        })
    }

    /// Current health classification
    ///
    /// # Errors
    ///
    /// Returns error if the cache strategy cannot report statistics
    pub async fn health_status(&self) -> MonitorResult<HealthStatus> {
        Ok(self.dashboard_snapshot().await?.health)
    }

    /// Current recommendations; never empty
    ///
    /// # Errors
    ///
    /// Returns error if the cache strategy cannot report statistics
    pub async fn get_optimization_recommendations(&self) -> MonitorResult<Vec<String>> {
        Ok(self.dashboard_snapshot().await?.recommendations)
    }

    /// One check cycle: classify, report issues, auto-optimize if needed
    ///
    /// # Errors
    ///
    /// Returns error if the cache strategy cannot report statistics.
    /// Optimization failures are absorbed.
    pub async fn run_health_check(&self) -> MonitorResult<HealthCheckOutcome> {
        let snapshot = self.dashboard_snapshot().await?;
        self.report_issues(&snapshot);

        let auto_optimization = if snapshot.cache_statistics.hit_ratio
            < self.config.auto_optimize_hit_ratio_threshold
        {
            self.trigger_auto_optimization(snapshot.cache_statistics.hit_ratio)
                .await
        } else {
            AutoOptimization::NotNeeded
        };

        let outcome = HealthCheckOutcome {
            snapshot,
            auto_optimization,
        };
        *self.last_check.write() = Some(outcome.clone());
        Ok(outcome)
    }

    fn report_issues(&self, snapshot: &DashboardSnapshot) {
        let health = &snapshot.health;
        if !health.has_issues() {
            self.sink.debug(&format!(
                "Health check passed: {}",
                health.overall.as_str()
            ));
            return;
        }

        if health.slow_queries {
            self.sink.warn(&format!(
                "Slow queries detected: avg {:.1}ms, {:.1}% slow",
                snapshot.query_summary.avg_execution_time_ms,
                snapshot.query_summary.slow_query_rate * 100.0
            ));
        }
        if health.low_cache_hit_ratio {
            self.sink.warn(&format!(
                "Low cache hit ratio: {:.1}%",
                snapshot.cache_statistics.hit_ratio * 100.0
            ));
        }
        if health.memory_pressure {
            self.sink.warn(&format!(
                "Cache memory pressure: a level is {:.0}% full",
                snapshot.cache_statistics.max_occupancy_ratio() * 100.0
            ));
        }
    }

    async fn trigger_auto_optimization(&self, hit_ratio: f64) -> AutoOptimization {
        self.sink.info(&format!(
            "Triggering cache optimization: hit ratio {:.1}% below {:.1}%",
            hit_ratio * 100.0,
            self.config.auto_optimize_hit_ratio_threshold * 100.0
        ));

        match self.cache_provider.optimize_cache_performance().await {
            Ok(()) => AutoOptimization::Triggered,
            Err(e) => {
                self.sink
                    .warn(&format!("Automatic cache optimization failed: {e}"));
                AutoOptimization::Failed(e.to_string())
            }
        }
    }

    /// Outcome of the most recent check cycle
    #[must_use]
    pub fn last_health_check(&self) -> Option<HealthCheckOutcome> {
        self.last_check.read().clone()
    }

    /// Start the periodic health check task
    ///
    /// Calling this while the task is running has no effect. A task that
    /// ended on its own is replaced.
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut task_slot = self.check_task.lock();
        if task_slot.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }

        let dashboard: Weak<Self> = Arc::downgrade(self);
        let shutdown = Arc::new(Notify::new());
        let shutdown_signal = Arc::clone(&shutdown);
        let check_interval = self.config.check_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(current) = dashboard.upgrade() else {
                            break;
                        };
                        if let Err(e) = current.run_health_check().await {
                            current.sink.error(&format!("Periodic health check failed: {e}"));
                        }
                    }
                    () = shutdown_signal.notified() => {
                        break;
                    }
                }
            }
        });

        *task_slot = Some(CheckTask { handle, shutdown });
        self.sink.info(&format!(
            "Periodic health checks started every {:?}",
            check_interval
        ));
    }

    /// Stop the periodic health check task and wait for it to exit
    pub async fn stop_monitoring(&self) {
        let task = self.check_task.lock().take();
        if let Some(CheckTask { handle, shutdown }) = task {
            shutdown.notify_one();
            if let Err(e) = handle.await {
                self.sink
                    .error(&format!("Health check task ended abnormally: {e}"));
            }
            self.sink.info("Periodic health checks stopped");
        }
    }

    /// True while the periodic task is running
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.check_task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}
