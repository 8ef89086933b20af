//! SQLite-backed validation store
//!
//! Reads schema metadata from `sqlite_master`, storage figures from `PRAGMA`s
//! and applied migrations from the `schema_migrations` table.

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::store::{checked_identifier, ProbeQuery, StorageStats, ValidationStore};
use crate::config::ValidationConfig;
use crate::error::{MonitorError, MonitorResult};

const MIGRATIONS_TABLE: &str = "schema_migrations";

fn db_error(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> MonitorError {
    move |e| MonitorError::store(operation, e.to_string())
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Validation store over a single SQLite connection
#[derive(Debug, Clone)]
pub struct SqliteValidationStore {
    /// Database connection
    connection: Arc<Mutex<Connection>>,
    /// Tables whose rows may be counted
    table_whitelist: Vec<String>,
}

impl SqliteValidationStore {
    /// Open a database file with foreign keys enforced
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn open(path: impl AsRef<Path>, config: &ValidationConfig) -> MonitorResult<Self> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(|e| {
            MonitorError::store("open", format!("Failed to open {}: {e}", path.display()))
        })?;
        connection
            .execute("PRAGMA foreign_keys=ON", [])
            .map_err(db_error("pragma_foreign_keys"))?;

        info!("Validation store opened at {}", path.display());
        Ok(Self::from_connection(connection, config))
    }

    /// Open a private in-memory database with foreign keys enforced
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created
    pub fn open_in_memory(config: &ValidationConfig) -> MonitorResult<Self> {
        let connection = Connection::open_in_memory()?;
        connection
            .execute("PRAGMA foreign_keys=ON", [])
            .map_err(db_error("pragma_foreign_keys"))?;
        Ok(Self::from_connection(connection, config))
    }

    /// Wrap an existing connection as-is
    #[must_use]
    pub fn from_connection(connection: Connection, config: &ValidationConfig) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
            table_whitelist: config.expected_tables.clone(),
        }
    }

    /// Run a batch of statements, e.g. a schema fixture
    ///
    /// # Errors
    ///
    /// Returns error if any statement fails
    pub async fn execute_batch(&self, sql: &str) -> MonitorResult<()> {
        let connection = self.connection.lock().await;
        connection
            .execute_batch(sql)
            .map_err(db_error("execute_batch"))
    }

    async fn names_of(&self, kind: &'static str) -> MonitorResult<Vec<String>> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(db_error("prepare_sqlite_master"))?;
        let names: Result<Vec<String>, rusqlite::Error> =
            stmt.query_map(params![kind], |row| row.get(0))?.collect();
        names.map_err(db_error("read_sqlite_master"))
    }

    async fn pragma_i64(&self, pragma: &'static str) -> MonitorResult<i64> {
        let connection = self.connection.lock().await;
        connection
            .query_row(&format!("PRAGMA {pragma}"), [], |row| row.get(0))
            .map_err(db_error(pragma))
    }
}

fn count_rows_of(connection: &Connection, sql: &str, bind: &[&str]) -> MonitorResult<u64> {
    let mut stmt = connection.prepare(sql).map_err(db_error("prepare_probe"))?;
    let mut rows = stmt
        .query(params_from_iter(bind.iter()))
        .map_err(db_error("run_probe"))?;
    let mut count: u64 = 0;
    while rows.next().map_err(db_error("read_probe"))?.is_some() {
        count += 1;
    }
    Ok(count)
}

const fn probe_sql(probe: ProbeQuery) -> &'static str {
    match probe {
        ProbeQuery::BasicListing => {
            "SELECT id, title, updated_at FROM local_notes \
             WHERE deleted = 0 ORDER BY updated_at DESC LIMIT 50"
        }
        ProbeQuery::TagAggregation => {
            "SELECT tag, COUNT(*) AS uses FROM note_tags \
             GROUP BY tag ORDER BY uses DESC LIMIT 20"
        }
        ProbeQuery::HierarchyJoin => {
            "SELECT n.id, f.name, COUNT(t.id) FROM local_notes n \
             LEFT JOIN note_folders nf ON nf.note_id = n.id \
             LEFT JOIN local_folders f ON f.id = nf.folder_id \
             LEFT JOIN note_tasks t ON t.note_id = n.id \
             WHERE n.deleted = 0 GROUP BY n.id LIMIT 50"
        }
        ProbeQuery::UnprocessedInbox => {
            "SELECT id FROM inbox_items WHERE is_processed = 0 \
             ORDER BY created_at DESC LIMIT 50"
        }
    }
}

#[async_trait]
impl ValidationStore for SqliteValidationStore {
    async fn table_names(&self) -> MonitorResult<Vec<String>> {
        self.names_of("table").await
    }

    async fn foreign_keys_enabled(&self) -> MonitorResult<bool> {
        Ok(self.pragma_i64("foreign_keys").await? == 1)
    }

    async fn index_names(&self) -> MonitorResult<Vec<String>> {
        self.names_of("index").await
    }

    async fn run_probe_query(&self, probe: ProbeQuery) -> MonitorResult<u64> {
        let connection = self.connection.lock().await;
        let rows = count_rows_of(&connection, probe_sql(probe), &[])?;
        debug!("Probe {} read {} rows", probe.as_str(), rows);
        Ok(rows)
    }

    async fn sample_note_ids(&self, limit: usize) -> MonitorResult<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare("SELECT id FROM local_notes WHERE deleted = 0 ORDER BY updated_at DESC LIMIT ?1")
            .map_err(db_error("prepare_sample_notes"))?;
        let ids: Result<Vec<String>, rusqlite::Error> =
            stmt.query_map(params![limit], |row| row.get(0))?.collect();
        ids.map_err(db_error("sample_notes"))
    }

    async fn fetch_notes_batched(&self, ids: &[String]) -> MonitorResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT n.id, n.title, n.body, t.tag FROM local_notes n \
             LEFT JOIN note_tags t ON t.note_id = n.id WHERE n.id IN ({placeholders})"
        );
        let bind: Vec<&str> = ids.iter().map(String::as_str).collect();

        let connection = self.connection.lock().await;
        count_rows_of(&connection, &sql, &bind)
    }

    async fn fetch_note(&self, id: &str) -> MonitorResult<u64> {
        let connection = self.connection.lock().await;
        let note: Option<String> = connection
            .query_row(
                "SELECT title FROM local_notes WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error("fetch_note"))?;
        let tags = count_rows_of(
            &connection,
            "SELECT tag FROM note_tags WHERE note_id = ?1",
            &[id],
        )?;
        Ok(u64::from(note.is_some()) + tags)
    }

    async fn migration_applied(&self, migration: &str) -> MonitorResult<bool> {
        let connection = self.connection.lock().await;
        let has_table: Option<String> = connection
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![MIGRATIONS_TABLE],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error("find_migrations_table"))?;
        if has_table.is_none() {
            return Ok(false);
        }

        let applied: Option<String> = connection
            .query_row(
                "SELECT name FROM schema_migrations WHERE name = ?1",
                params![migration],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error("find_migration"))?;
        Ok(applied.is_some())
    }

    async fn schema_version(&self) -> MonitorResult<u32> {
        let version = self.pragma_i64("user_version").await?;
        u32::try_from(version).map_err(|_| {
            MonitorError::store("user_version", format!("out of range: {version}"))
        })
    }

    async fn integrity_check(&self) -> MonitorResult<bool> {
        let connection = self.connection.lock().await;
        let result: String = connection
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(db_error("integrity_check"))?;
        Ok(result.eq_ignore_ascii_case("ok"))
    }

    async fn storage_stats(&self) -> MonitorResult<StorageStats> {
        Ok(StorageStats {
            page_count: non_negative(self.pragma_i64("page_count").await?),
            page_size: non_negative(self.pragma_i64("page_size").await?),
            free_pages: non_negative(self.pragma_i64("freelist_count").await?),
        })
    }

    async fn count_rows(&self, table: &str) -> MonitorResult<u64> {
        let table = checked_identifier(table, &self.table_whitelist)?;
        let connection = self.connection.lock().await;
        let count: i64 = connection
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                row.get(0)
            })
            .map_err(db_error("count_rows"))?;
        Ok(non_negative(count))
    }
}
