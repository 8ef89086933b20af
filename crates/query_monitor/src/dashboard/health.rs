//! Health classification and optimization recommendations
//!
//! Pure functions over a query summary and cache statistics.

use serde::{Deserialize, Serialize};

use crate::cache::CacheStatistics;
use crate::monitor::ReportSummary;

/// Ordered tier thresholds: (max avg ms, max slow rate, min hit ratio), all exclusive
const EXCELLENT: (f64, f64, f64) = (50.0, 0.02, 0.90);
const GOOD: (f64, f64, f64) = (100.0, 0.05, 0.80);
const FAIR: (f64, f64, f64) = (150.0, 0.10, 0.60);

/// Average execution time at which queries count as slow
const SLOW_AVG_MS: f64 = 100.0;
/// Slow query rate at which queries count as slow
const SLOW_RATE_LIMIT: f64 = 0.10;
/// Hit ratio below which the cache is flagged
const LOW_HIT_RATIO: f64 = 0.80;
/// Occupancy above which a cache level is under memory pressure
const MEMORY_PRESSURE_RATIO: f64 = 0.90;
/// Healthy database: average below this
const HEALTHY_AVG_MS: f64 = 100.0;
/// Healthy database: slow rate below this
const HEALTHY_SLOW_RATE: f64 = 0.05;

/// Hit ratio below which a larger cache is recommended
const WARMING_HIT_RATIO: f64 = 0.70;
/// Hit ratio below which invalidation policy should be reviewed
const INVALIDATION_HIT_RATIO: f64 = 0.50;

/// Message returned when no recommendation applies
pub const OPTIMAL_PERFORMANCE_MESSAGE: &str =
    "Performance is optimal. No immediate optimizations needed.";

/// Ordinal health classification, `Poor < Fair < Good < Excellent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    /// None of the other tiers matched
    Poor,
    /// avg < 150ms, slow rate < 10%, hit ratio > 60%
    Fair,
    /// avg < 100ms, slow rate < 5%, hit ratio > 80%
    Good,
    /// avg < 50ms, slow rate < 2%, hit ratio > 90%
    Excellent,
}

impl HealthTier {
    /// Lowercase tier name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

/// Query-side inputs to the classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryHealthInput {
    /// Average execution time over all operations
    pub avg_execution_time_ms: f64,
    /// Slow queries over total queries
    pub slow_query_rate: f64,
}

impl From<&ReportSummary> for QueryHealthInput {
    fn from(summary: &ReportSummary) -> Self {
        Self {
            avg_execution_time_ms: summary.avg_execution_time_ms,
            slow_query_rate: summary.slow_query_rate,
        }
    }
}

/// Classifier output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall tier
    pub overall: HealthTier,
    /// avg >= 100ms or slow rate >= 10%
    pub slow_queries: bool,
    /// hit ratio < 80%
    pub low_cache_hit_ratio: bool,
    /// some L1 cache level is more than 90% full
    pub memory_pressure: bool,
    /// avg < 100ms and slow rate < 5%
    pub database_healthy: bool,
}

impl HealthStatus {
    /// True when any problem flag is raised
    #[must_use]
    pub const fn has_issues(&self) -> bool {
        self.slow_queries || self.low_cache_hit_ratio || self.memory_pressure
    }
}

fn tier_matches(query: &QueryHealthInput, hit_ratio: f64, limits: (f64, f64, f64)) -> bool {
    let (max_avg, max_slow_rate, min_hit_ratio) = limits;
    query.avg_execution_time_ms < max_avg
        && query.slow_query_rate < max_slow_rate
        && hit_ratio > min_hit_ratio
}

fn has_memory_pressure(cache: &CacheStatistics) -> bool {
    cache
        .l1_caches
        .iter()
        .any(|level| level.occupancy_ratio() > MEMORY_PRESSURE_RATIO)
}

/// Classify overall health; the first matching tier wins
#[must_use]
pub fn classify(query: &QueryHealthInput, cache: &CacheStatistics) -> HealthStatus {
    let hit_ratio = cache.hit_ratio;

    let overall = if tier_matches(query, hit_ratio, EXCELLENT) {
        HealthTier::Excellent
    } else if tier_matches(query, hit_ratio, GOOD) {
        HealthTier::Good
    } else if tier_matches(query, hit_ratio, FAIR) {
        HealthTier::Fair
    } else {
        HealthTier::Poor
    };

    HealthStatus {
        overall,
        slow_queries: query.avg_execution_time_ms >= SLOW_AVG_MS
            || query.slow_query_rate >= SLOW_RATE_LIMIT,
        low_cache_hit_ratio: hit_ratio < LOW_HIT_RATIO,
        memory_pressure: has_memory_pressure(cache),
        database_healthy: query.avg_execution_time_ms < HEALTHY_AVG_MS
            && query.slow_query_rate < HEALTHY_SLOW_RATE,
    }
}

/// Ordered recommendations; never empty
#[must_use]
pub fn optimization_recommendations(
    query: &QueryHealthInput,
    cache: &CacheStatistics,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if query.avg_execution_time_ms >= SLOW_AVG_MS {
        recommendations.push(format!(
            "Average query time is {:.1}ms. Consider adding indexes for frequently filtered columns.",
            query.avg_execution_time_ms
        ));
    }

    if query.slow_query_rate > SLOW_RATE_LIMIT {
        recommendations.push(format!(
            "{:.1}% of queries are slow. Review the slow query log and optimize the worst offenders.",
            query.slow_query_rate * 100.0
        ));
    }

    if cache.hit_ratio < WARMING_HIT_RATIO {
        recommendations.push(format!(
            "Cache hit ratio is {:.1}%. Consider increasing cache size or warming frequently accessed data.",
            cache.hit_ratio * 100.0
        ));
    }

    if cache.hit_ratio < INVALIDATION_HIT_RATIO {
        recommendations.push(
            "Cache hit ratio is very low. Review the cache invalidation strategy and TTL settings."
                .to_string(),
        );
    }

    for level in &cache.l1_caches {
        if level.occupancy_ratio() > MEMORY_PRESSURE_RATIO {
            recommendations.push(format!(
                "Cache '{}' is {:.0}% full. Consider tuning eviction or raising its memory limit.",
                level.name,
                level.occupancy_ratio() * 100.0
            ));
        }
    }

    if recommendations.is_empty() {
        recommendations.push(OPTIMAL_PERFORMANCE_MESSAGE.to_string());
    }

    recommendations
}
