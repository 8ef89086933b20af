//! Database Optimization Validator
//!
//! Runs six independent sub-checks against a [`ValidationStore`]:
//! schema, indexes, probe query latency, N+1 prevention, migration state and
//! storage health. A failing store call marks only its own sub-check invalid;
//! the remaining checks still run and the run never returns an error.

pub mod results;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::config::ValidationConfig;
use crate::error::MonitorResult;
use crate::events::{EventSink, TracingSink};

pub use results::{
    CheckResult, CheckSummary, FlatMap, IndexCheck, MigrationCheck, N1PreventionCheck,
    PerformanceCheck, QueryTiming, SchemaCheck, StorageHealthCheck, ValidationReport,
};
pub use store::{checked_identifier, ProbeQuery, StorageStats, ValidationStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteValidationStore;

/// Batched fetches faster than this are treated as taking this long
const MIN_MEASURABLE: Duration = Duration::from_micros(1);

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Judge a batched fetch against the same entities fetched one by one
///
/// `performance_improvement = individual / batched`; the check passes when it
/// reaches `required_improvement`. A zero batched time is clamped to 1µs.
#[must_use]
pub fn evaluate_n1_prevention(
    entity_count: usize,
    batched: Duration,
    individual: Duration,
    required_improvement: f64,
) -> N1PreventionCheck {
    let batched_ms = duration_ms(batched.max(MIN_MEASURABLE));
    let individual_ms = duration_ms(individual);
    let performance_improvement = individual_ms / batched_ms;

    N1PreventionCheck {
        is_valid: performance_improvement >= required_improvement,
        entity_count,
        batched_time_ms: duration_ms(batched),
        individual_time_ms: individual_ms,
        performance_improvement,
        required_improvement,
        error: None,
    }
}

/// Validates that the local database carries its performance optimizations
pub struct DatabaseOptimizationValidator {
    store: Arc<dyn ValidationStore>,
    config: ValidationConfig,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for DatabaseOptimizationValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseOptimizationValidator")
            .field("config", &self.config)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl DatabaseOptimizationValidator {
    /// Create a validator that logs through `tracing`
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is inconsistent
    pub fn new(store: Arc<dyn ValidationStore>, config: ValidationConfig) -> MonitorResult<Self> {
        Self::with_sink(store, config, Arc::new(TracingSink))
    }

    /// Create a validator with an explicit event sink
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is inconsistent
    pub fn with_sink(
        store: Arc<dyn ValidationStore>,
        config: ValidationConfig,
        sink: Arc<dyn EventSink>,
    ) -> MonitorResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            sink,
        })
    }

    /// Validation targets
    #[must_use]
    pub const fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Run all six sub-checks in order
    pub async fn run_complete_validation(&self) -> ValidationReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        self.sink
            .info(&format!("Starting database optimization validation {run_id}"));

        let schema = self.validate_schema().await;
        self.log_check(&schema);
        let indexes = self.validate_indexes().await;
        self.log_check(&indexes);
        let performance = self.validate_query_performance().await;
        self.log_check(&performance);
        let n1_prevention = self.validate_n1_prevention().await;
        self.log_check(&n1_prevention);
        let migration = self.validate_migration().await;
        self.log_check(&migration);
        let health = self.check_storage_health().await;
        self.log_check(&health);

        let is_valid = schema.is_valid
            && indexes.is_valid
            && performance.is_valid
            && n1_prevention.is_valid
            && migration.is_valid
            && health.is_valid;

        let report = ValidationReport {
            run_id,
            started_at,
            is_valid,
            total_duration_ms: duration_ms(start.elapsed()),
            schema,
            indexes,
            performance,
            n1_prevention,
            migration,
            health,
        };

        if report.is_valid {
            self.sink.info(&format!(
                "Database validation passed in {:.1}ms",
                report.total_duration_ms
            ));
        } else {
            self.sink.warn(&format!(
                "Database validation failed in {:.1}ms: {}",
                report.total_duration_ms,
                report.failed_checks().join(", ")
            ));
        }

        report
    }

    fn log_check<C: CheckResult>(&self, check: &C) {
        match (check.is_valid(), check.error()) {
            (_, Some(error)) => self
                .sink
                .error(&format!("Validation check '{}' errored: {error}", check.check_name())),
            (true, None) => self
                .sink
                .debug(&format!("Validation check '{}' passed", check.check_name())),
            (false, None) => self
                .sink
                .warn(&format!("Validation check '{}' failed", check.check_name())),
        }
    }

    /// Expected tables present and foreign keys enforced
    pub async fn validate_schema(&self) -> SchemaCheck {
        match self.schema_inner().await {
            Ok(check) => check,
            Err(e) => SchemaCheck::failed(e.to_string()),
        }
    }

    async fn schema_inner(&self) -> MonitorResult<SchemaCheck> {
        let present: HashSet<String> = self.store.table_names().await?.into_iter().collect();
        let missing_tables: Vec<String> = self
            .config
            .expected_tables
            .iter()
            .filter(|table| !present.contains(*table))
            .cloned()
            .collect();
        let foreign_keys_enabled = self.store.foreign_keys_enabled().await?;

        Ok(SchemaCheck {
            is_valid: missing_tables.is_empty() && foreign_keys_enabled,
            tables_found: self.config.expected_tables.len() - missing_tables.len(),
            missing_tables,
            foreign_keys_enabled,
            error: None,
        })
    }

    /// Critical indexes present
    pub async fn validate_indexes(&self) -> IndexCheck {
        let present: HashSet<String> = match self.store.index_names().await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => return IndexCheck::failed(e.to_string()),
        };
        let missing_indexes: Vec<String> = self
            .config
            .critical_indexes
            .iter()
            .filter(|index| !present.contains(*index))
            .cloned()
            .collect();

        IndexCheck {
            is_valid: missing_indexes.is_empty(),
            indexes_found: self.config.critical_indexes.len() - missing_indexes.len(),
            missing_indexes,
            error: None,
        }
    }

    /// Slowest probe query within the latency limit
    ///
    /// Every probe is attempted. Failed probes are left out of the timings
    /// and their errors are joined into the check's error.
    pub async fn validate_query_performance(&self) -> PerformanceCheck {
        let threshold_ms = self.config.max_query_time_ms;
        let mut query_timings = Vec::with_capacity(ProbeQuery::ALL.len());
        let mut probe_errors = Vec::new();

        for probe in ProbeQuery::ALL {
            let start = Instant::now();
            match self.store.run_probe_query(probe).await {
                Ok(rows) => query_timings.push(QueryTiming {
                    query: probe.as_str().to_string(),
                    duration_ms: duration_ms(start.elapsed()),
                    rows,
                }),
                Err(e) => probe_errors.push(format!("{}: {e}", probe.as_str())),
            }
        }

        let max_query_time_ms = query_timings
            .iter()
            .map(|t| t.duration_ms)
            .fold(0.0_f64, f64::max);

        #[allow(clippy::cast_precision_loss)]
        let within_limit = max_query_time_ms <= threshold_ms as f64;
        let error = (!probe_errors.is_empty()).then(|| probe_errors.join("; "));

        PerformanceCheck {
            is_valid: within_limit && error.is_none(),
            query_timings,
            max_query_time_ms,
            threshold_ms,
            error,
        }
    }

    /// Batched fetch at least `min_batch_improvement` times faster
    pub async fn validate_n1_prevention(&self) -> N1PreventionCheck {
        let required = self.config.min_batch_improvement;
        match self.n1_inner(required).await {
            Ok(check) => check,
            Err(e) => N1PreventionCheck {
                required_improvement: required,
                ..N1PreventionCheck::failed(e.to_string())
            },
        }
    }

    async fn n1_inner(&self, required: f64) -> MonitorResult<N1PreventionCheck> {
        let ids = self.store.sample_note_ids(self.config.n1_sample_size).await?;
        if ids.is_empty() {
            self.sink
                .debug("No notes available for N+1 comparison; check passes vacuously");
            return Ok(N1PreventionCheck {
                is_valid: true,
                required_improvement: required,
                ..N1PreventionCheck::default()
            });
        }

        let start = Instant::now();
        self.store.fetch_notes_batched(&ids).await?;
        let batched = start.elapsed();

        let start = Instant::now();
        for id in &ids {
            self.store.fetch_note(id).await?;
        }
        let individual = start.elapsed();

        Ok(evaluate_n1_prevention(ids.len(), batched, individual, required))
    }

    /// Required migration applied and schema version current
    pub async fn validate_migration(&self) -> MigrationCheck {
        let required_migration = self.config.required_migration.clone();
        let expected_version = self.config.expected_schema_version;

        let applied = self.store.migration_applied(&required_migration).await;
        let version = self.store.schema_version().await;

        match (applied, version) {
            (Ok(migration_applied), Ok(schema_version)) => MigrationCheck {
                is_valid: migration_applied && schema_version >= expected_version,
                required_migration,
                migration_applied,
                schema_version,
                expected_version,
                error: None,
            },
            (Err(e), _) | (_, Err(e)) => MigrationCheck {
                required_migration,
                expected_version,
                ..MigrationCheck::failed(e.to_string())
            },
        }
    }

    /// Storage integrity, size, compaction need and record counts
    pub async fn check_storage_health(&self) -> StorageHealthCheck {
        match self.health_inner().await {
            Ok(check) => check,
            Err(e) => StorageHealthCheck::failed(e.to_string()),
        }
    }

    async fn health_inner(&self) -> MonitorResult<StorageHealthCheck> {
        let integrity_ok = self.store.integrity_check().await?;
        let stats = self.store.storage_stats().await?;
        let needs_compaction = stats.free_pages > self.config.compaction_free_page_threshold;
        let total_records = self.count_whitelisted_records().await?;

        let mut recommendations = Vec::new();
        if !integrity_ok {
            recommendations.push(
                "Integrity check reported problems. Restore from backup or rebuild the database."
                    .to_string(),
            );
        }
        if needs_compaction {
            recommendations.push(format!(
                "{} free pages can be reclaimed. Run VACUUM to compact the database.",
                stats.free_pages
            ));
        }

        Ok(StorageHealthCheck {
            is_valid: integrity_ok,
            integrity_ok,
            database_size_bytes: stats.size_bytes(),
            free_pages: stats.free_pages,
            needs_compaction,
            total_records,
            recommendations,
            error: None,
        })
    }

    async fn count_whitelisted_records(&self) -> MonitorResult<u64> {
        let present: HashSet<String> = self.store.table_names().await?.into_iter().collect();
        let whitelist = &self.config.expected_tables;
        let mut total: u64 = 0;

        for table in whitelist.iter().filter(|t| present.contains(*t)) {
            match checked_identifier(table, whitelist) {
                Ok(name) => {
                    total = total.saturating_add(self.store.count_rows(name).await?);
                }
                Err(e) => self.sink.warn(&format!("Skipping record count: {e}")),
            }
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::events::{EventLevel, MemorySink};
    use async_trait::async_trait;

    /// In-memory store with switchable failures
    #[derive(Default)]
    struct FakeStore {
        tables: Vec<String>,
        indexes: Vec<String>,
        foreign_keys: bool,
        fail_probes: bool,
        failing_probe: Option<ProbeQuery>,
        fail_integrity: bool,
        note_ids: Vec<String>,
        migration_applied: bool,
        schema_version: u32,
        free_pages: u64,
        rows_per_table: u64,
    }

    impl FakeStore {
        fn healthy(config: &ValidationConfig) -> Self {
            Self {
                tables: config.expected_tables.clone(),
                indexes: config.critical_indexes.clone(),
                foreign_keys: true,
                migration_applied: true,
                schema_version: config.expected_schema_version,
                rows_per_table: 3,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ValidationStore for FakeStore {
        async fn table_names(&self) -> MonitorResult<Vec<String>> {
            Ok(self.tables.clone())
        }

        async fn foreign_keys_enabled(&self) -> MonitorResult<bool> {
            Ok(self.foreign_keys)
        }

        async fn index_names(&self) -> MonitorResult<Vec<String>> {
            Ok(self.indexes.clone())
        }

        async fn run_probe_query(&self, probe: ProbeQuery) -> MonitorResult<u64> {
            if self.fail_probes || self.failing_probe == Some(probe) {
                return Err(MonitorError::store(probe.as_str(), "disk I/O error"));
            }
            Ok(1)
        }

        async fn sample_note_ids(&self, limit: usize) -> MonitorResult<Vec<String>> {
            Ok(self.note_ids.iter().take(limit).cloned().collect())
        }

        async fn fetch_notes_batched(&self, ids: &[String]) -> MonitorResult<u64> {
            Ok(ids.len() as u64)
        }

        async fn fetch_note(&self, _id: &str) -> MonitorResult<u64> {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(1)
        }

        async fn migration_applied(&self, _migration: &str) -> MonitorResult<bool> {
            Ok(self.migration_applied)
        }

        async fn schema_version(&self) -> MonitorResult<u32> {
            Ok(self.schema_version)
        }

        async fn integrity_check(&self) -> MonitorResult<bool> {
            if self.fail_integrity {
                return Err(MonitorError::store("integrity_check", "database is locked"));
            }
            Ok(true)
        }

        async fn storage_stats(&self) -> MonitorResult<StorageStats> {
            Ok(StorageStats {
                page_count: 100,
                page_size: 4096,
                free_pages: self.free_pages,
            })
        }

        async fn count_rows(&self, _table: &str) -> MonitorResult<u64> {
            Ok(self.rows_per_table)
        }
    }

    fn validator(store: FakeStore) -> (DatabaseOptimizationValidator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let validator = DatabaseOptimizationValidator::with_sink(
            Arc::new(store),
            ValidationConfig::default(),
            sink.clone(),
        )
        .expect("default config is valid");
        (validator, sink)
    }

    #[tokio::test]
    async fn test_healthy_store_passes_every_check() {
        let config = ValidationConfig::default();
        let (validator, _sink) = validator(FakeStore::healthy(&config));

        let report = validator.run_complete_validation().await;

        assert!(report.is_valid, "failed: {:?}", report.failed_checks());
        assert_eq!(report.schema.tables_found, config.expected_tables.len());
        assert_eq!(report.performance.query_timings.len(), 4);
        assert_eq!(report.health.total_records, 3 * config.expected_tables.len() as u64);
        assert!(report.total_duration_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_failing_probe_isolated_from_siblings() {
        let config = ValidationConfig::default();
        let store = FakeStore {
            fail_probes: true,
            ..FakeStore::healthy(&config)
        };
        let (validator, sink) = validator(store);

        let report = validator.run_complete_validation().await;

        assert!(!report.is_valid);
        assert!(!report.performance.is_valid);
        assert!(report
            .performance
            .error
            .as_deref()
            .is_some_and(|e| e.contains("basic_listing")));
        assert!(report.schema.is_valid && report.schema.error.is_none());
        assert!(report.indexes.is_valid && report.indexes.error.is_none());
        assert!(report.n1_prevention.is_valid && report.n1_prevention.error.is_none());
        assert!(report.migration.is_valid && report.migration.error.is_none());
        assert!(report.health.is_valid && report.health.error.is_none());
        assert_eq!(report.failed_checks(), vec!["performance"]);
        assert_eq!(sink.count_at(EventLevel::Error), 1);
    }

    #[tokio::test]
    async fn test_remaining_probes_timed_after_one_fails() {
        let config = ValidationConfig::default();
        let store = FakeStore {
            failing_probe: Some(ProbeQuery::TagAggregation),
            ..FakeStore::healthy(&config)
        };
        let (validator, _sink) = validator(store);

        let check = validator.validate_query_performance().await;

        assert!(!check.is_valid);
        let timed: Vec<&str> = check.query_timings.iter().map(|t| t.query.as_str()).collect();
        assert_eq!(timed, vec!["basic_listing", "hierarchy_join", "unprocessed_inbox"]);
        assert_eq!(
            check.error.as_deref(),
            Some("tag_aggregation: Store operation failed: tag_aggregation - disk I/O error")
        );
        assert_eq!(check.threshold_ms, config.max_query_time_ms);
    }

    #[tokio::test]
    async fn test_missing_tables_and_foreign_keys() {
        let config = ValidationConfig::default();
        let mut store = FakeStore::healthy(&config);
        store.tables.retain(|t| t != "note_links" && t != "inbox_items");
        store.foreign_keys = false;
        let (validator, _sink) = validator(store);

        let schema = validator.validate_schema().await;

        assert!(!schema.is_valid);
        assert!(!schema.foreign_keys_enabled);
        assert_eq!(schema.missing_tables, vec!["note_links", "inbox_items"]);
    }

    #[tokio::test]
    async fn test_missing_index_reported() {
        let config = ValidationConfig::default();
        let mut store = FakeStore::healthy(&config);
        store.indexes.retain(|i| i != "idx_note_tags_tag");
        let (validator, _sink) = validator(store);

        let indexes = validator.validate_indexes().await;

        assert!(!indexes.is_valid);
        assert_eq!(indexes.missing_indexes, vec!["idx_note_tags_tag"]);
        assert_eq!(indexes.indexes_found, config.critical_indexes.len() - 1);
    }

    #[tokio::test]
    async fn test_outdated_schema_version_fails_migration() {
        let config = ValidationConfig::default();
        let store = FakeStore {
            schema_version: 11,
            ..FakeStore::healthy(&config)
        };
        let (validator, _sink) = validator(store);

        let migration = validator.validate_migration().await;

        assert!(!migration.is_valid);
        assert!(migration.migration_applied);
        assert_eq!(migration.schema_version, 11);
        assert_eq!(migration.expected_version, 12);
    }

    #[tokio::test]
    async fn test_compaction_recommended_above_threshold() {
        let config = ValidationConfig::default();
        let store = FakeStore {
            free_pages: 1001,
            ..FakeStore::healthy(&config)
        };
        let (validator, _sink) = validator(store);

        let health = validator.check_storage_health().await;

        assert!(health.is_valid);
        assert!(health.needs_compaction);
        assert_eq!(health.database_size_bytes, 409_600);
        assert!(health.recommendations[0].contains("VACUUM"));
    }

    #[tokio::test]
    async fn test_health_error_captured() {
        let config = ValidationConfig::default();
        let store = FakeStore {
            fail_integrity: true,
            ..FakeStore::healthy(&config)
        };
        let (validator, _sink) = validator(store);

        let report = validator.run_complete_validation().await;

        assert!(!report.health.is_valid);
        assert!(report.health.error.as_deref().is_some_and(|e| e.contains("locked")));
        assert_eq!(report.failed_checks(), vec!["health"]);
    }

    #[tokio::test]
    async fn test_n1_prevention_measures_real_fetches() {
        let config = ValidationConfig::default();
        let store = FakeStore {
            note_ids: (0..8).map(|i| format!("note-{i}")).collect(),
            ..FakeStore::healthy(&config)
        };
        let (validator, _sink) = validator(store);

        let check = validator.validate_n1_prevention().await;

        assert_eq!(check.entity_count, 5);
        assert!(check.individual_time_ms >= 10.0);
        assert!(check.is_valid);
    }

    #[test]
    fn test_batching_below_required_improvement() {
        let check = evaluate_n1_prevention(
            5,
            Duration::from_millis(10),
            Duration::from_millis(15),
            2.0,
        );

        assert!((check.performance_improvement - 1.5).abs() < 1e-9);
        assert!(!check.is_valid);
        assert!(check.batched_time_ms < check.individual_time_ms);
    }

    #[test]
    fn test_zero_batched_time_does_not_divide_by_zero() {
        let check = evaluate_n1_prevention(5, Duration::ZERO, Duration::from_millis(1), 2.0);
        assert!(check.performance_improvement.is_finite());
        assert!(check.is_valid);
    }

    #[test]
    fn test_report_flattens_each_check() {
        let report = ValidationReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            is_valid: false,
            total_duration_ms: 1.0,
            schema: SchemaCheck::failed("boom"),
            indexes: IndexCheck::default(),
            performance: PerformanceCheck::default(),
            n1_prevention: N1PreventionCheck::default(),
            migration: MigrationCheck::default(),
            health: StorageHealthCheck::default(),
        };

        let maps = report.to_flat_maps();
        assert_eq!(maps.len(), 6);
        assert_eq!(
            maps["schema"].get("error"),
            Some(&serde_json::Value::String("boom".to_string()))
        );
    }
}
