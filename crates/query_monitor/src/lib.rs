//! Duru Notes Query Monitor - Query Performance Monitoring and Validation
//!
//! This crate times local database operations, aggregates rolling statistics,
//! flags slow queries against fixed thresholds, and turns the numbers into
//! reports, health tiers and a pass/fail database validation.

#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]
//!
//! # Features
//!
//! - **Recorder**: wraps any async operation, times it, and passes its result
//!   or error through untouched
//! - **Aggregator**: per-operation counts, min/max/total time, bounded slow log
//! - **Reports**: slowest, most frequent and recent slow operations
//! - **Dashboard**: health tiers, recommendations, periodic auto-optimization
//! - **Validator**: six isolated checks over the local `SQLite` database
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Query Monitor                           │
//! ├─────────────────┬──────────────────┬─────────────────────────┤
//! │    Recorder     │    Dashboard     │       Validator         │
//! │   (monitor())   │ (health, auto-   │ (schema, indexes, N+1,  │
//! │                 │  optimization)   │  migration, storage)    │
//! ├─────────────────┼──────────────────┼─────────────────────────┤
//! │   Aggregator    │  CacheStats      │   ValidationStore       │
//! │ (stats + slow   │  Provider        │   (SQLite)              │
//! │  query log)     │  (external)      │                         │
//! └─────────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use notes_query_monitor::{MonitorConfig, QueryPerformanceMonitor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = QueryPerformanceMonitor::new(MonitorConfig::default())?;
//!
//!     let notes: Result<Vec<String>, std::io::Error> = monitor
//!         .monitor("list_notes", || async { Ok(vec!["Groceries".to_string()]) })
//!         .await;
//!     assert_eq!(notes?.len(), 1);
//!
//!     let report = monitor.get_performance_report();
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! # Performance Targets
//!
//! - **Slow query**: > 100ms
//! - **Approaching threshold**: > 50ms
//! - **Slow query rate**: < 5%

// Public exports
pub use self::config::*;
pub use self::error::*;
pub use self::types::*;

pub use self::cache::{CacheLevelStats, CacheStatistics, CacheStatsProvider};
pub use self::dashboard::{
    AutoOptimization, DashboardSnapshot, HealthCheckOutcome, HealthStatus, HealthTier,
    PerformanceDashboard,
};
pub use self::events::{EventLevel, EventSink, MemorySink, TracingSink};
pub use self::monitor::{PerformanceExport, PerformanceReport, QueryPerformanceMonitor, ReportSummary};
pub use self::validation::{
    evaluate_n1_prevention, CheckResult, DatabaseOptimizationValidator, ProbeQuery,
    ValidationReport, ValidationStore,
};

#[cfg(feature = "sqlite")]
pub use self::validation::SqliteValidationStore;

// Internal modules
pub mod config;
pub mod error;
pub mod events;
pub mod types;

// Cache statistics contract
pub mod cache;

// Recorder, aggregator and reports
pub mod monitor;

// Health dashboard
pub mod dashboard;

// Database validation
pub mod validation;
