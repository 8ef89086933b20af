//! Query Monitor Configuration
//!
//! One configuration structure shared by the recorder, the dashboard and the
//! validator so every component sees the same thresholds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};

/// Main configuration for the monitoring core
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Recorder, aggregator and dashboard thresholds
    pub monitor: MonitorConfig,

    /// Database optimization validator targets
    pub validation: ValidationConfig,
}

/// Thresholds and capacities for query monitoring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Operations slower than this are slow queries (milliseconds)
    pub slow_threshold_ms: u64,

    /// Operations slower than this are reported as approaching the slow threshold
    pub warning_threshold_ms: u64,

    /// Capacity of the slow query log
    pub max_slow_query_log_size: usize,

    /// Interval between periodic health checks
    #[serde(rename = "check_interval_secs", with = "duration_secs")]
    pub check_interval: Duration,

    /// Cache hit ratio below which cache optimization is triggered automatically
    pub auto_optimize_hit_ratio_threshold: f64,
}

/// Targets for the database optimization validator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Tables the local database must contain
    pub expected_tables: Vec<String>,

    /// Indexes the query paths rely on
    pub critical_indexes: Vec<String>,

    /// Migration that must have been applied
    pub required_migration: String,

    /// Minimum schema version
    pub expected_schema_version: u32,

    /// Slowest allowed probe query (milliseconds)
    pub max_query_time_ms: u64,

    /// Required ratio of individual fetch time to batched fetch time
    pub min_batch_improvement: f64,

    /// Number of entities fetched by the N+1 prevention check
    pub n1_sample_size: usize,

    /// Free page count above which compaction is recommended
    pub compaction_free_page_threshold: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 100,
            warning_threshold_ms: 50,
            max_slow_query_log_size: 100,
            check_interval: Duration::from_secs(300), // 5 minutes
            auto_optimize_hit_ratio_threshold: 0.6,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expected_tables: [
                "local_notes",
                "note_tags",
                "note_links",
                "note_reminders",
                "note_tasks",
                "local_folders",
                "note_folders",
                "saved_searches",
                "pending_ops",
                "inbox_items",
            ]
            .iter()
            .map(|t| (*t).to_string())
            .collect(),
            critical_indexes: [
                "idx_notes_updated_at",
                "idx_notes_deleted",
                "idx_note_tags_tag",
                "idx_note_tags_note_id",
                "idx_note_folders_folder_id",
                "idx_note_tasks_note_id",
                "idx_folders_parent_id",
                "idx_inbox_items_processed",
            ]
            .iter()
            .map(|i| (*i).to_string())
            .collect(),
            required_migration: "add_performance_indexes".to_string(),
            expected_schema_version: 12,
            max_query_time_ms: 100,
            min_batch_improvement: 2.0,
            n1_sample_size: 5,
            compaction_free_page_threshold: 1000,
        }
    }
}

impl MonitoringConfig {
    /// Parse configuration from a TOML document
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or the values are inconsistent
    pub fn from_toml_str(source: &str) -> MonitorResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file (format chosen by extension)
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the values are inconsistent
    pub fn load(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        tracing::info!("Monitoring configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found
    pub fn validate(&self) -> MonitorResult<()> {
        self.monitor.validate()?;
        self.validation.validate()
    }
}

impl MonitorConfig {
    /// Validate thresholds
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Configuration` on inconsistent thresholds
    pub fn validate(&self) -> MonitorResult<()> {
        if self.slow_threshold_ms == 0 {
            return Err(MonitorError::configuration(
                "slow_threshold_ms must be greater than 0",
            ));
        }
        if self.warning_threshold_ms >= self.slow_threshold_ms {
            return Err(MonitorError::configuration(format!(
                "warning_threshold_ms ({}) must be below slow_threshold_ms ({})",
                self.warning_threshold_ms, self.slow_threshold_ms
            )));
        }
        if self.max_slow_query_log_size == 0 {
            return Err(MonitorError::configuration(
                "max_slow_query_log_size must be greater than 0",
            ));
        }
        if self.check_interval.is_zero() {
            return Err(MonitorError::configuration(
                "check_interval must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.auto_optimize_hit_ratio_threshold) {
            return Err(MonitorError::configuration(
                "auto_optimize_hit_ratio_threshold must be within 0.0..=1.0",
            ));
        }
        Ok(())
    }
}

impl ValidationConfig {
    /// Validate targets
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Configuration` on unusable targets
    pub fn validate(&self) -> MonitorResult<()> {
        if self.max_query_time_ms == 0 {
            return Err(MonitorError::configuration(
                "max_query_time_ms must be greater than 0",
            ));
        }
        if self.min_batch_improvement <= 0.0 {
            return Err(MonitorError::configuration(
                "min_batch_improvement must be positive",
            ));
        }
        if self.n1_sample_size == 0 {
            return Err(MonitorError::configuration(
                "n1_sample_size must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Serialize durations as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
