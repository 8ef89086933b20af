//! Integration tests for the Duru Notes query monitor
//!
//! End-to-end flows across the recorder, reports, dashboard and validator.

#![allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
#![allow(clippy::expect_used)] // Tests are allowed to use expect for simplicity
#![allow(clippy::panic)] // Tests are allowed to panic
#![allow(clippy::default_numeric_fallback)] // Test data can have default numeric types
#![allow(clippy::uninlined_format_args)] // Test formatting can be verbose

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use notes_query_monitor::{
    AutoOptimization, CacheLevelStats, CacheStatistics, CacheStatsProvider,
    DatabaseOptimizationValidator, EventLevel, HealthTier, MemorySink, MonitorConfig,
    MonitorError, MonitorResult, MonitoringConfig, PerformanceDashboard, QueryPerformanceMonitor,
    SqliteValidationStore, ValidationConfig,
};

const NOTES_SCHEMA: &str = r"
    CREATE TABLE local_notes (id TEXT PRIMARY KEY, title TEXT NOT NULL, body TEXT NOT NULL DEFAULT '', updated_at INTEGER NOT NULL, deleted INTEGER NOT NULL DEFAULT 0);
    CREATE TABLE note_tags (note_id TEXT NOT NULL REFERENCES local_notes(id), tag TEXT NOT NULL, PRIMARY KEY (note_id, tag));
    CREATE TABLE note_links (source_id TEXT NOT NULL, target_id TEXT NOT NULL);
    CREATE TABLE note_reminders (id INTEGER PRIMARY KEY, note_id TEXT NOT NULL, remind_at INTEGER NOT NULL);
    CREATE TABLE note_tasks (id INTEGER PRIMARY KEY, note_id TEXT NOT NULL, content TEXT NOT NULL, done INTEGER NOT NULL DEFAULT 0);
    CREATE TABLE local_folders (id TEXT PRIMARY KEY, name TEXT NOT NULL, parent_id TEXT);
    CREATE TABLE note_folders (note_id TEXT PRIMARY KEY, folder_id TEXT NOT NULL);
    CREATE TABLE saved_searches (id TEXT PRIMARY KEY, query TEXT NOT NULL);
    CREATE TABLE pending_ops (id INTEGER PRIMARY KEY, kind TEXT NOT NULL);
    CREATE TABLE inbox_items (id TEXT PRIMARY KEY, payload TEXT NOT NULL, is_processed INTEGER NOT NULL DEFAULT 0, created_at INTEGER NOT NULL);
    CREATE TABLE schema_migrations (name TEXT PRIMARY KEY, applied_at INTEGER NOT NULL);
    CREATE INDEX idx_notes_updated_at ON local_notes(updated_at);
    CREATE INDEX idx_notes_deleted ON local_notes(deleted);
    CREATE INDEX idx_note_tags_tag ON note_tags(tag);
    CREATE INDEX idx_note_tags_note_id ON note_tags(note_id);
    CREATE INDEX idx_note_folders_folder_id ON note_folders(folder_id);
    CREATE INDEX idx_note_tasks_note_id ON note_tasks(note_id);
    CREATE INDEX idx_folders_parent_id ON local_folders(parent_id);
    CREATE INDEX idx_inbox_items_processed ON inbox_items(is_processed);
    INSERT INTO schema_migrations VALUES ('add_performance_indexes', 1700000000);
    INSERT INTO local_folders VALUES ('f1', 'Work', NULL), ('f2', 'Projects', 'f1');
    INSERT INTO local_notes (id, title, updated_at) VALUES ('n1', 'Standup', 10), ('n2', 'Roadmap', 20);
    INSERT INTO note_folders VALUES ('n1', 'f1'), ('n2', 'f2');
    INSERT INTO note_tags VALUES ('n1', 'daily'), ('n2', 'planning');
    INSERT INTO note_tasks (note_id, content) VALUES ('n2', 'Draft Q3 goals');
    PRAGMA user_version = 12;
";

/// Cache provider with a fixed hit ratio that counts optimization calls
#[derive(Debug)]
struct StaticCacheProvider {
    hit_ratio: f64,
    levels: Vec<CacheLevelStats>,
    optimizations: AtomicUsize,
    fail_optimization: bool,
}

impl StaticCacheProvider {
    fn new(hit_ratio: f64) -> Self {
        Self {
            hit_ratio,
            levels: vec![CacheLevelStats::new("notes", 40, 100)],
            optimizations: AtomicUsize::new(0),
            fail_optimization: false,
        }
    }

    fn optimizations(&self) -> usize {
        self.optimizations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStatsProvider for StaticCacheProvider {
    async fn get_cache_statistics(&self) -> MonitorResult<CacheStatistics> {
        Ok(CacheStatistics {
            hit_ratio: self.hit_ratio,
            l1_caches: self.levels.clone(),
        })
    }

    async fn optimize_cache_performance(&self) -> MonitorResult<()> {
        self.optimizations.fetch_add(1, Ordering::SeqCst);
        if self.fail_optimization {
            return Err(MonitorError::cache("optimize", "warmup query timed out"));
        }
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        slow_threshold_ms: 20,
        warning_threshold_ms: 10,
        check_interval: Duration::from_millis(25),
        ..MonitorConfig::default()
    }
}

/// Test that results and errors pass through and land in the report
#[tokio::test]
async fn test_recorder_feeds_report() -> anyhow::Result<()> {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let monitor = QueryPerformanceMonitor::with_sink(MonitorConfig::default(), sink.clone())?;

    for _ in 0..3 {
        let titles: Result<Vec<&str>, std::io::Error> = monitor
            .monitor("list_notes", || async { Ok(vec!["Standup", "Roadmap"]) })
            .await;
        assert_eq!(titles?.len(), 2);
    }

    let failed: Result<(), String> = monitor
        .monitor("sync_folder", || async { Err("remote unavailable".to_string()) })
        .await;
    assert_eq!(failed, Err("remote unavailable".to_string()));

    let report = monitor.get_performance_report();
    assert_eq!(report.summary.total_queries, 4);
    assert_eq!(report.summary.failed_queries, 1);
    assert!((report.summary.success_rate - 0.75).abs() < 1e-9);
    assert_eq!(report.most_frequent_queries[0].operation, "list_notes");
    assert_eq!(report.most_frequent_queries[0].total_executions, 3);
    assert_eq!(sink.count_at(EventLevel::Warn), 0);
    Ok(())
}

/// Test that concurrent monitored calls never lose a sample
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_monitoring_keeps_every_sample() -> anyhow::Result<()> {
    let monitor = Arc::new(QueryPerformanceMonitor::new(MonitorConfig::default())?);

    let tasks = (0..64).map(|i| {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move {
            let name = if i % 2 == 0 { "load_note" } else { "search_notes" };
            monitor
                .monitor(name, move || async move {
                    tokio::task::yield_now().await;
                    if i % 8 == 0 {
                        Err(i)
                    } else {
                        Ok(i)
                    }
                })
                .await
        })
    });

    for joined in join_all(tasks).await {
        let _ = joined?;
    }

    let summary = monitor.summary();
    assert_eq!(summary.total_queries, 64);
    assert_eq!(summary.failed_queries, 8);

    let load = monitor.statistics_for("load_note").expect("load_note tracked");
    assert_eq!(load.total_executions, 32);
    assert_eq!(load.successful_executions, 24);
    Ok(())
}

/// Test slow queries through the dashboard with auto-optimization
#[tokio::test]
async fn test_slow_queries_reach_dashboard() -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::new());
    let monitor = Arc::new(QueryPerformanceMonitor::with_sink(fast_config(), sink.clone())?);

    let slow: Result<(), std::io::Error> = monitor
        .monitor("rebuild_fts_index", || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(())
        })
        .await;
    slow?;
    monitor.record("list_notes", Duration::from_millis(2), true);

    let provider = Arc::new(StaticCacheProvider::new(0.45));
    let dashboard = PerformanceDashboard::with_sink(
        Arc::clone(&monitor),
        provider.clone(),
        sink.clone(),
    );

    let outcome = dashboard.run_health_check().await?;

    assert_eq!(outcome.auto_optimization, AutoOptimization::Triggered);
    assert_eq!(provider.optimizations(), 1);
    assert_eq!(outcome.snapshot.health.overall, HealthTier::Poor);
    assert!(outcome.snapshot.health.slow_queries);
    assert!(outcome.snapshot.health.low_cache_hit_ratio);
    assert!(!outcome.snapshot.within_targets);
    assert!(outcome
        .snapshot
        .recommendations
        .iter()
        .any(|r| r.contains("invalidation")));

    let report = monitor.get_performance_report();
    assert_eq!(report.recent_slow_queries.len(), 1);
    assert_eq!(report.recent_slow_queries[0].operation, "rebuild_fts_index");
    assert!(sink
        .messages_at(EventLevel::Warn)
        .iter()
        .any(|m| m.contains("rebuild_fts_index")));
    Ok(())
}

/// Test that an optimization failure is absorbed by the periodic task
#[tokio::test]
async fn test_periodic_checks_absorb_optimization_failures() -> anyhow::Result<()> {
    let monitor = Arc::new(QueryPerformanceMonitor::new(fast_config())?);
    let provider = Arc::new(StaticCacheProvider {
        fail_optimization: true,
        ..StaticCacheProvider::new(0.3)
    });
    let dashboard = Arc::new(PerformanceDashboard::new(monitor, provider.clone()));

    dashboard.start_monitoring();
    assert!(dashboard.is_monitoring());
    tokio::time::sleep(Duration::from_millis(120)).await;
    dashboard.stop_monitoring().await;

    assert!(!dashboard.is_monitoring());
    assert!(provider.optimizations() >= 2);
    let last = dashboard.last_health_check().expect("at least one check ran");
    assert!(matches!(last.auto_optimization, AutoOptimization::Failed(_)));
    Ok(())
}

/// Test the full validator against a database file
#[tokio::test]
async fn test_validator_against_database_file() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = ValidationConfig::default();
    let store = Arc::new(SqliteValidationStore::open(
        dir.path().join("notes.db"),
        &config,
    )?);
    store.execute_batch(NOTES_SCHEMA).await?;

    let validator = DatabaseOptimizationValidator::new(store.clone(), config.clone())?;
    let report = validator.run_complete_validation().await;

    assert!(report.schema.is_valid);
    assert!(report.indexes.is_valid);
    assert!(report.migration.is_valid);
    assert!(report.health.is_valid);
    assert_eq!(report.health.total_records, 2 + 2 + 1 + 2 + 2);
    assert_eq!(report.n1_prevention.entity_count, 2);
    assert!(report.performance.query_timings.iter().all(|t| t.duration_ms >= 0.0));

    // Dropping a critical index fails only the index check
    store.execute_batch("DROP INDEX idx_note_tags_tag;").await?;
    let report = validator.run_complete_validation().await;

    assert!(!report.is_valid);
    assert_eq!(report.indexes.missing_indexes, vec!["idx_note_tags_tag".to_string()]);
    assert!(report.schema.is_valid);
    assert!(report.migration.is_valid);

    let exported = serde_json::to_value(&report)?;
    assert_eq!(exported["indexes"]["is_valid"], serde_json::Value::Bool(false));
    Ok(())
}

/// Test validation of an empty database
#[tokio::test]
async fn test_validator_on_empty_database() -> anyhow::Result<()> {
    let config = ValidationConfig::default();
    let store = Arc::new(SqliteValidationStore::open_in_memory(&config)?);
    let validator = DatabaseOptimizationValidator::new(store, config.clone())?;

    let report = validator.run_complete_validation().await;

    assert!(!report.is_valid);
    assert_eq!(report.schema.missing_tables.len(), config.expected_tables.len());
    assert_eq!(report.indexes.indexes_found, 0);
    assert!(!report.migration.migration_applied);
    // Probe queries hit missing tables
    assert!(report.performance.error.is_some());
    assert!(report.health.is_valid);
    assert_eq!(report.health.total_records, 0);
    Ok(())
}

/// Test configuration loaded from a TOML file
#[test]
fn test_configuration_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("monitoring.toml");
    std::fs::write(
        &path,
        r#"
[monitor]
slow_threshold_ms = 250
warning_threshold_ms = 120
check_interval_secs = 60

[validation]
expected_schema_version = 14
"#,
    )?;

    let config = MonitoringConfig::load(&path)?;

    assert_eq!(config.monitor.slow_threshold_ms, 250);
    assert_eq!(config.monitor.check_interval, Duration::from_secs(60));
    assert_eq!(config.monitor.max_slow_query_log_size, 100);
    assert_eq!(config.validation.expected_schema_version, 14);
    assert_eq!(config.validation.required_migration, "add_performance_indexes");

    let monitor = QueryPerformanceMonitor::new(config.monitor)?;
    assert_eq!(monitor.summary().target_threshold_ms, 250);
    Ok(())
}

/// Test exported diagnostics
#[tokio::test]
async fn test_export_performance_data() -> anyhow::Result<()> {
    let monitor = QueryPerformanceMonitor::new(fast_config())?;
    monitor.record("load_note", Duration::from_millis(25), true);
    monitor.record("load_note", Duration::from_millis(3), true);

    let exported: serde_json::Value =
        serde_json::from_str(&monitor.export_performance_data(Some("last_hour"))?)?;

    assert_eq!(exported["period"], "last_hour");
    assert_eq!(exported["system_info"]["storage_engine"], "sqlite");
    assert_eq!(exported["report"]["summary"]["slow_queries"], 1);
    assert_eq!(exported["report"]["slowest_queries"][0]["max_time_ms"], 25);
    Ok(())
}
