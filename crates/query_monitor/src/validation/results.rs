//! Validation sub-check results
//!
//! Each sub-check has its own typed result. Results flatten to a key-value map
//! only when exported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Flat key-value view of a result
pub type FlatMap = BTreeMap<String, serde_json::Value>;

/// Shared surface of every sub-check result
pub trait CheckResult: Serialize {
    /// Sub-check name
    fn check_name(&self) -> &'static str;

    /// Whether the sub-check passed
    fn is_valid(&self) -> bool;

    /// Error captured while running the sub-check
    fn error(&self) -> Option<&str>;

    /// Flatten into a key-value map for logging and export
    fn to_map(&self) -> FlatMap {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(fields)) => fields.into_iter().collect(),
            Ok(other) => {
                let mut map = FlatMap::new();
                map.insert("value".to_string(), other);
                map
            }
            Err(e) => {
                let mut map = FlatMap::new();
                map.insert("is_valid".to_string(), serde_json::Value::Bool(self.is_valid()));
                map.insert(
                    "error".to_string(),
                    serde_json::Value::String(format!("serialization failed: {e}")),
                );
                map
            }
        }
    }
}

macro_rules! impl_check_result {
    ($ty:ty, $name:literal) => {
        impl CheckResult for $ty {
            fn check_name(&self) -> &'static str {
                $name
            }

            fn is_valid(&self) -> bool {
                self.is_valid
            }

            fn error(&self) -> Option<&str> {
                self.error.as_deref()
            }
        }

        impl $ty {
            /// Invalid result carrying only the failure message
            #[must_use]
            pub fn failed(error: impl Into<String>) -> Self {
                Self {
                    error: Some(error.into()),
                    ..Self::default()
                }
            }
        }
    };
}

/// Expected tables present and foreign keys enforced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCheck {
    /// Sub-check passed
    pub is_valid: bool,
    /// Expected tables that exist
    pub tables_found: usize,
    /// Expected tables that are missing
    pub missing_tables: Vec<String>,
    /// Foreign key enforcement flag
    pub foreign_keys_enabled: bool,
    /// Failure message
    pub error: Option<String>,
}

/// Critical indexes present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCheck {
    /// Sub-check passed
    pub is_valid: bool,
    /// Critical indexes that exist
    pub indexes_found: usize,
    /// Critical indexes that are missing
    pub missing_indexes: Vec<String>,
    /// Failure message
    pub error: Option<String>,
}

/// Timing of one probe query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTiming {
    /// Probe name
    pub query: String,
    /// Measured duration
    pub duration_ms: f64,
    /// Rows read
    pub rows: u64,
}

/// Every probe query within the latency limit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCheck {
    /// Sub-check passed
    pub is_valid: bool,
    /// Per-probe timings
    pub query_timings: Vec<QueryTiming>,
    /// Slowest probe
    pub max_query_time_ms: f64,
    /// Latency limit
    pub threshold_ms: u64,
    /// Failure message
    pub error: Option<String>,
}

/// Batched fetch measurably faster than individual fetches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct N1PreventionCheck {
    /// Sub-check passed
    pub is_valid: bool,
    /// Entities fetched by each path
    pub entity_count: usize,
    /// One batched fetch
    pub batched_time_ms: f64,
    /// Sum of the individual fetches
    pub individual_time_ms: f64,
    /// individual / batched
    pub performance_improvement: f64,
    /// Required improvement
    pub required_improvement: f64,
    /// Failure message
    pub error: Option<String>,
}

/// Required migration applied and schema version current
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationCheck {
    /// Sub-check passed
    pub is_valid: bool,
    /// Migration that must be applied
    pub required_migration: String,
    /// Whether it is applied
    pub migration_applied: bool,
    /// Current schema version
    pub schema_version: u32,
    /// Minimum schema version
    pub expected_version: u32,
    /// Failure message
    pub error: Option<String>,
}

/// Storage integrity, size, compaction need and record counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageHealthCheck {
    /// Sub-check passed
    pub is_valid: bool,
    /// Integrity verification passed
    pub integrity_ok: bool,
    /// Database size in bytes
    pub database_size_bytes: u64,
    /// Reclaimable pages
    pub free_pages: u64,
    /// Free pages above the compaction threshold
    pub needs_compaction: bool,
    /// Rows across the whitelisted tables that exist
    pub total_records: u64,
    /// Maintenance advice
    pub recommendations: Vec<String>,
    /// Failure message
    pub error: Option<String>,
}

impl_check_result!(SchemaCheck, "schema");
impl_check_result!(IndexCheck, "indexes");
impl_check_result!(PerformanceCheck, "performance");
impl_check_result!(N1PreventionCheck, "n1_prevention");
impl_check_result!(MigrationCheck, "migration");
impl_check_result!(StorageHealthCheck, "health");

/// Outcome of a complete validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Run identifier
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// AND of every sub-check
    pub is_valid: bool,
    /// Wall time of the whole run
    pub total_duration_ms: f64,
    /// Schema sub-check
    pub schema: SchemaCheck,
    /// Index sub-check
    pub indexes: IndexCheck,
    /// Latency sub-check
    pub performance: PerformanceCheck,
    /// Batching sub-check
    pub n1_prevention: N1PreventionCheck,
    /// Migration sub-check
    pub migration: MigrationCheck,
    /// Storage health sub-check
    pub health: StorageHealthCheck,
}

impl ValidationReport {
    /// Sub-checks as trait objects, in execution order
    #[must_use]
    pub fn checks(&self) -> [&dyn CheckSummary; 6] {
        [
            &self.schema,
            &self.indexes,
            &self.performance,
            &self.n1_prevention,
            &self.migration,
            &self.health,
        ]
    }

    /// Names of the sub-checks that failed
    #[must_use]
    pub fn failed_checks(&self) -> Vec<&'static str> {
        self.checks()
            .iter()
            .filter(|c| !c.passed())
            .map(|c| c.name())
            .collect()
    }

    /// Every sub-check flattened, keyed by check name
    #[must_use]
    pub fn to_flat_maps(&self) -> BTreeMap<&'static str, FlatMap> {
        self.checks()
            .iter()
            .map(|c| (c.name(), c.flat()))
            .collect()
    }
}

/// Object-safe view over [`CheckResult`]
pub trait CheckSummary {
    /// Sub-check name
    fn name(&self) -> &'static str;
    /// Whether the sub-check passed
    fn passed(&self) -> bool;
    /// Flattened result
    fn flat(&self) -> FlatMap;
}

impl<T: CheckResult> CheckSummary for T {
    fn name(&self) -> &'static str {
        self.check_name()
    }

    fn passed(&self) -> bool {
        self.is_valid()
    }

    fn flat(&self) -> FlatMap {
        self.to_map()
    }
}
