//! Cache statistics contract
//!
//! The cache strategy lives outside this crate. The dashboard only reads its
//! statistics and, when the hit ratio collapses, asks it to optimize itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MonitorResult;

/// Safe casting utilities for ratio calculations
mod safe_cast {
    /// Convert u64 to f64, warning when precision is lost
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn u64_to_f64_safe(value: u64) -> f64 {
        // f64 mantissa is 52 bits
        const MAX_SAFE_U64_FOR_F64: u64 = (1_u64 << 52) - 1;

        if value > MAX_SAFE_U64_FOR_F64 {
            tracing::warn!("Precision loss detected in u64->f64 conversion: {}", value);
        }

        value as f64
    }

    /// Ratio that yields 0.0 for an empty denominator
    #[must_use]
    pub fn safe_ratio(numerator: u64, denominator: u64) -> f64 {
        if denominator == 0 {
            0.0_f64
        } else {
            u64_to_f64_safe(numerator) / u64_to_f64_safe(denominator)
        }
    }
}

pub use safe_cast::{safe_ratio, u64_to_f64_safe};

/// Occupancy of one in-memory (L1) cache level
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheLevelStats {
    /// Cache name (notes, folders, tags, ...)
    pub name: String,

    /// Current number of entries
    pub size: u64,

    /// Configured maximum number of entries
    pub max_size: u64,
}

impl CacheLevelStats {
    /// Create level statistics
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64, max_size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            max_size,
        }
    }

    /// Current size over configured maximum; 0.0 for an unbounded level
    #[must_use]
    pub fn occupancy_ratio(&self) -> f64 {
        safe_ratio(self.size, self.max_size)
    }
}

/// Snapshot reported by the cache strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CacheStatistics {
    /// Fraction of lookups served without touching the database
    pub hit_ratio: f64,

    /// Per-level L1 occupancy
    pub l1_caches: Vec<CacheLevelStats>,
}

impl CacheStatistics {
    /// Hit ratio from raw hit and miss counts
    #[must_use]
    pub fn from_counts(hits: u64, misses: u64, l1_caches: Vec<CacheLevelStats>) -> Self {
        Self {
            hit_ratio: safe_ratio(hits, hits + misses),
            l1_caches,
        }
    }

    /// Highest occupancy ratio over all levels
    #[must_use]
    pub fn max_occupancy_ratio(&self) -> f64 {
        self.l1_caches
            .iter()
            .map(CacheLevelStats::occupancy_ratio)
            .fold(0.0_f64, f64::max)
    }
}

/// Read and optimize contract of the external cache strategy
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStatsProvider: Send + Sync {
    /// Current cache statistics
    async fn get_cache_statistics(&self) -> MonitorResult<CacheStatistics>;

    /// Best-effort cache tuning (warming, eviction, resizing)
    async fn optimize_cache_performance(&self) -> MonitorResult<()>;
}
