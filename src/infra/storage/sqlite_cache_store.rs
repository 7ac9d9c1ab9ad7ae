use crate::core::storage::{
    check_identifier, check_row_keys, CacheStats, CacheStore, CleanupReport, RecordStore, Row,
    SelectQuery, StoreError, DEFAULT_CACHE_TTL_SECS,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{Map, Number, Value};
use sqlx::migrate::Migrator;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::{Column, Pool, Row as _, Sqlite, TypeInfo, ValueRef};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Schema history for the cache database, tracked in `_sqlx_migrations`.
static MIGRATOR: Migrator = sqlx::migrate!("./migrations/shortterm");

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(ttl_secs: u64) -> i64 {
    now_ms().saturating_add(i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX))
}

/// Embedded SQLite store for cache entries, per-guild settings, sessions and
/// a short-lived log. Expiry columns hold epoch milliseconds.
pub struct SqliteCacheStore {
    pool: Pool<Sqlite>,
}

impl SqliteCacheStore {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "Cache store ready");
        Ok(store)
    }

    /// Apply every embedded migration not yet recorded. Safe to run on each start.
    async fn migrate(&self) -> anyhow::Result<()> {
        MIGRATOR.run(&self.pool).await?;
        debug!(migrations = MIGRATOR.iter().count(), "Cache schema up to date");
        Ok(())
    }

    /// Run `work` inside one transaction: committed on `Ok`, rolled back on `Err`.
    pub async fn transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>
            + Send,
    {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        match work(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(backend)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn pragma(&self, name: &str) -> Result<u64, StoreError> {
        let value: i64 = sqlx::query_scalar(&format!("PRAGMA {name}"))
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(value.max(0) as u64)
    }

    async fn count(&self, table: &str) -> Result<u64, StoreError> {
        check_identifier(table)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count.max(0) as u64)
    }
}

// ============================================================================
// SQL BUILDING
// ============================================================================

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        nested => query.bind(nested.to_string()),
    }
}

/// `WHERE a = ? AND b IS NULL`, plus the values to bind in order.
fn where_clause(filters: &Row) -> (String, Vec<&Value>) {
    if filters.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut parts = Vec::with_capacity(filters.len());
    let mut values = Vec::new();
    for (column, value) in filters {
        if value.is_null() {
            parts.push(format!("{column} IS NULL"));
        } else {
            parts.push(format!("{column} = ?"));
            values.push(value);
        }
    }
    (format!(" WHERE {}", parts.join(" AND ")), values)
}

fn select_sql<'a>(table: &str, query: &'a SelectQuery) -> (String, Vec<&'a Value>) {
    let columns = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(", ")
    };
    let (filter, values) = where_clause(&query.filters);
    let mut sql = format!("SELECT {columns} FROM {table}{filter}");

    if let Some(order) = &query.order_by {
        let direction = if order.ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(" ORDER BY {} {direction}", order.column));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    (sql, values)
}

fn insert_sql(table: &str, row: &Row) -> String {
    if row.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES RETURNING *");
    }
    let columns: Vec<&str> = row.keys().map(String::as_str).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) RETURNING *",
        columns.join(", ")
    )
}

/// Decode by the storage class of each value. BLOBs come back as base64.
fn row_to_json(row: &SqliteRow) -> Result<Row, StoreError> {
    let mut out = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(backend)?;
        let storage = if raw.is_null() {
            "NULL".to_string()
        } else {
            raw.type_info().name().to_string()
        };

        let value = match storage.as_str() {
            "NULL" => Value::Null,
            "INTEGER" => Value::from(row.try_get::<i64, _>(i).map_err(backend)?),
            "REAL" => Number::from_f64(row.try_get::<f64, _>(i).map_err(backend)?)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            "BLOB" => Value::String(STANDARD.encode(row.try_get::<Vec<u8>, _>(i).map_err(backend)?)),
            _ => Value::String(row.try_get::<String, _>(i).map_err(backend)?),
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn parse_payload(text: &str) -> Result<Value, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Backend(e.to_string()))
}

// ============================================================================
// RECORD STORE
// ============================================================================

#[async_trait]
impl RecordStore for SqliteCacheStore {
    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        check_identifier(table)?;
        if rows.is_empty() {
            return Err(StoreError::EmptyWrite);
        }
        for row in &rows {
            check_row_keys(row)?;
        }

        let owned_table = table.to_string();
        let stored = self
            .transaction(move |conn| {
                Box::pin(async move {
                    let mut stored = Vec::with_capacity(rows.len());
                    for row in &rows {
                        let sql = insert_sql(&owned_table, row);
                        let query = row
                            .values()
                            .fold(sqlx::query(&sql), |query, value| bind_value(query, value));
                        let inserted = query.fetch_one(&mut *conn).await.map_err(backend)?;
                        stored.push(row_to_json(&inserted)?);
                    }
                    Ok(stored)
                })
            })
            .await?;

        debug!(table, rows = stored.len(), "Rows inserted");
        Ok(stored)
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        check_identifier(table)?;
        query.check()?;

        let (sql, values) = select_sql(table, query);
        let rows = values
            .into_iter()
            .fold(sqlx::query(&sql), bind_value)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(row_to_json).collect()
    }

    async fn update(&self, table: &str, patch: Row, filters: Row) -> Result<Vec<Row>, StoreError> {
        check_identifier(table)?;
        check_row_keys(&patch)?;
        check_row_keys(&filters)?;
        if patch.is_empty() {
            return Err(StoreError::EmptyWrite);
        }
        if filters.is_empty() {
            return Err(StoreError::MissingFilter("update"));
        }

        let assignments: Vec<String> = patch.keys().map(|k| format!("{k} = ?")).collect();
        let (filter, filter_values) = where_clause(&filters);
        let sql = format!(
            "UPDATE {table} SET {}{filter} RETURNING *",
            assignments.join(", ")
        );

        let rows = patch
            .values()
            .chain(filter_values)
            .fold(sqlx::query(&sql), bind_value)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(row_to_json).collect()
    }

    async fn delete(&self, table: &str, filters: Row) -> Result<u64, StoreError> {
        check_identifier(table)?;
        check_row_keys(&filters)?;
        if filters.is_empty() {
            return Err(StoreError::MissingFilter("delete"));
        }

        let (filter, values) = where_clause(&filters);
        let sql = format!("DELETE FROM {table}{filter}");
        let result = values
            .into_iter()
            .fold(sqlx::query(&sql), bind_value)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        check_identifier(table)?;
        let found: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(found > 0)
    }

    async fn table_info(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        check_identifier(table)?;
        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_json).collect()
    }
}

// ============================================================================
// CACHE STORE
// ============================================================================

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn set_cache(
        &self,
        key: &str,
        value: &Value,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError> {
        let expires_at = expiry_ms(ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS));
        sqlx::query(
            "INSERT OR REPLACE INTO cache (key, data, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(expires_at)
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_cache(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM cache WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(now_ms())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        data.as_deref().map(parse_payload).transpose()
    }

    async fn set_setting(
        &self,
        guild_id: u64,
        key: &str,
        value: &Value,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bot_settings (guild_id, key, value, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(guild_id as i64)
        .bind(key)
        .bind(value.to_string())
        .bind(ttl_secs.map(expiry_ms))
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_setting(&self, guild_id: u64, key: &str) -> Result<Option<Value>, StoreError> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM bot_settings WHERE guild_id = ? AND key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(guild_id as i64)
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        value.as_deref().map(parse_payload).transpose()
    }

    async fn set_session(
        &self,
        user_id: u64,
        data: &Value,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO user_sessions (user_id, session_data, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id as i64)
        .bind(data.to_string())
        .bind(expiry_ms(ttl_secs))
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_session(&self, user_id: u64) -> Result<Option<Value>, StoreError> {
        let data: Option<String> = sqlx::query_scalar(
            "SELECT session_data FROM user_sessions WHERE user_id = ? AND expires_at > ?",
        )
        .bind(user_id as i64)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        data.as_deref().map(parse_payload).transpose()
    }

    async fn append_log(
        &self,
        level: &str,
        message: &str,
        metadata: Option<&Value>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO temp_logs (level, message, data, created_at) VALUES (?, ?, ?, ?)")
            .bind(level)
            .bind(message)
            .bind(metadata.map(Value::to_string))
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn cleanup(&self) -> Result<CleanupReport, StoreError> {
        let now = now_ms();

        let cache = sqlx::query("DELETE FROM cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();

        let settings = sqlx::query(
            "DELETE FROM bot_settings WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?
        .rows_affected();

        let sessions = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();

        Ok(CleanupReport {
            cache,
            settings,
            sessions,
        })
    }

    async fn stats(&self) -> Result<CacheStats, StoreError> {
        Ok(CacheStats {
            cache_entries: self.count("cache").await?,
            settings: self.count("bot_settings").await?,
            sessions: self.count("user_sessions").await?,
            log_lines: self.count("temp_logs").await?,
            size_bytes: self.pragma("page_count").await? * self.pragma("page_size").await?,
        })
    }

    async fn vacuum(&self) -> Result<(), StoreError> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        info!("Cache store vacuumed");
        Ok(())
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Cache store closed");
        }
    }
}
