//! Data store contract used by the validator

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{MonitorError, MonitorResult};

/// Representative queries timed by the performance check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeQuery {
    /// Latest notes, newest first
    BasicListing,
    /// Tag usage counts
    TagAggregation,
    /// Notes joined with folders and tasks
    HierarchyJoin,
    /// Unprocessed inbox items
    UnprocessedInbox,
}

impl ProbeQuery {
    /// Full probe battery in execution order
    pub const ALL: [Self; 4] = [
        Self::BasicListing,
        Self::TagAggregation,
        Self::HierarchyJoin,
        Self::UnprocessedInbox,
    ];

    /// Stable probe name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BasicListing => "basic_listing",
            Self::TagAggregation => "tag_aggregation",
            Self::HierarchyJoin => "hierarchy_join",
            Self::UnprocessedInbox => "unprocessed_inbox",
        }
    }
}

/// Page-level storage figures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageStats {
    /// Pages in the database file
    pub page_count: u64,
    /// Bytes per page
    pub page_size: u64,
    /// Pages on the free list (reclaimable)
    pub free_pages: u64,
}

impl StorageStats {
    /// Database size in bytes
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.page_count.saturating_mul(self.page_size)
    }
}

/// Read access to the local database needed by the validator
#[async_trait]
pub trait ValidationStore: Send + Sync {
    /// Names of all user tables
    async fn table_names(&self) -> MonitorResult<Vec<String>>;

    /// Whether foreign key constraints are enforced
    async fn foreign_keys_enabled(&self) -> MonitorResult<bool>;

    /// Names of all indexes
    async fn index_names(&self) -> MonitorResult<Vec<String>>;

    /// Execute a probe query, returning the number of rows read
    async fn run_probe_query(&self, probe: ProbeQuery) -> MonitorResult<u64>;

    /// Ids of up to `limit` live notes
    async fn sample_note_ids(&self, limit: usize) -> MonitorResult<Vec<String>>;

    /// Fetch the given notes with their tags in one query
    async fn fetch_notes_batched(&self, ids: &[String]) -> MonitorResult<u64>;

    /// Fetch one note with its tags
    async fn fetch_note(&self, id: &str) -> MonitorResult<u64>;

    /// Whether the named migration has been applied
    async fn migration_applied(&self, migration: &str) -> MonitorResult<bool>;

    /// Current schema version
    async fn schema_version(&self) -> MonitorResult<u32>;

    /// Run the storage integrity verification
    async fn integrity_check(&self) -> MonitorResult<bool>;

    /// Page-level storage figures
    async fn storage_stats(&self) -> MonitorResult<StorageStats>;

    /// Row count of a whitelisted table
    async fn count_rows(&self, table: &str) -> MonitorResult<u64>;
}

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").ok())
        .as_ref()
}

/// Accept `identifier` only if it is whitelisted and purely `[A-Za-z0-9_]`
///
/// Table names cannot be bound as parameters, so this gate runs before any
/// identifier is interpolated into SQL.
///
/// # Errors
///
/// Returns `MonitorError::Validation` if either condition fails
pub fn checked_identifier<'a>(identifier: &'a str, whitelist: &[String]) -> MonitorResult<&'a str> {
    if !whitelist.iter().any(|allowed| allowed == identifier) {
        return Err(MonitorError::validation(
            "identifier",
            format!("'{identifier}' is not a whitelisted table"),
        ));
    }

    let well_formed = match identifier_pattern() {
        Some(pattern) => pattern.is_match(identifier),
        None => {
            !identifier.is_empty()
                && identifier
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
    };
    if !well_formed {
        return Err(MonitorError::validation(
            "identifier",
            format!("'{identifier}' contains characters outside [A-Za-z0-9_]"),
        ));
    }

    Ok(identifier)
}
