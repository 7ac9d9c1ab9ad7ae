use crate::core::storage::{
    check_identifier, check_row_keys, DurableStore, RecordStore, Row, SelectQuery, StoreError,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

const HEALTH_TABLE: &str = "_health_check";
const MIGRATIONS_TABLE: &str = "_migrations";

const CREATE_MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (\
    id SERIAL PRIMARY KEY, \
    name TEXT UNIQUE NOT NULL, \
    executed_at TIMESTAMPTZ DEFAULT NOW())";

fn backend(e: reqwest::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Durable store backed by a Supabase project's PostgREST endpoint.
pub struct SupabaseStore {
    client: Client,
    rest_url: String,
    connected: AtomicBool,
}

impl SupabaseStore {
    pub fn new(project_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| StoreError::Backend(e.to_string());

        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(api_key).map_err(invalid)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(invalid)?,
        );
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(backend)?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            connected: AtomicBool::new(false),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }

    async fn send_for_rows(request: RequestBuilder) -> Result<Vec<Row>, StoreError> {
        let response = request.send().await.map_err(backend)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!("{status}: {body}")));
        }
        response.json::<Vec<Row>>().await.map_err(backend)
    }

    /// Call a Postgres function exposed under `/rpc`.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(format!("{}/rpc/{function}", self.rest_url))
            .json(&args)
            .send()
            .await
            .map_err(backend)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!("rpc {function}: {status}: {body}")));
        }
        let body = response.text().await.map_err(backend)?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Raw SQL through the project's `execute_sql` function.
    async fn execute_sql(&self, sql: &str) -> Result<Value, StoreError> {
        self.rpc("execute_sql", json!({ "sql_query": sql, "params": [] }))
            .await
    }

    async fn ensure_migrations_table(&self) -> Result<(), StoreError> {
        if let Err(e) = self.rpc("create_migrations_table", json!({})).await {
            debug!(error = %e, "create_migrations_table unavailable, using execute_sql");
            self.execute_sql(CREATE_MIGRATIONS_TABLE).await?;
        }
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<HashSet<String>, StoreError> {
        let rows = self
            .select(MIGRATIONS_TABLE, &SelectQuery::new().columns(["name"]))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}

/// `*.sql` files under `dir` not named in `applied`, sorted by file name.
fn pending_migrations(
    dir: &Path,
    applied: &HashSet<String>,
) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::Backend(e.to_string()))?;
    let mut pending: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "sql"))
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            (!applied.contains(&name)).then_some((name, path))
        })
        .collect();
    pending.sort();
    Ok(pending)
}

// ============================================================================
// QUERY ENCODING
// ============================================================================

/// PostgREST operand for an equality filter.
fn filter_operand(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}

fn filter_params(filters: &Row) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(column, value)| (column.clone(), filter_operand(value)))
        .collect()
}

fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
    let columns = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(",")
    };

    let mut params = vec![("select".to_string(), columns)];
    params.extend(filter_params(&query.filters));
    if let Some(order) = &query.order_by {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

// ============================================================================
// PORTS
// ============================================================================

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        self.ensure_connected()?;
        check_identifier(table)?;
        if rows.is_empty() {
            return Err(StoreError::EmptyWrite);
        }
        for row in &rows {
            check_row_keys(row)?;
        }

        let request = self.client.post(self.table_url(table)).json(&rows);
        let stored = Self::send_for_rows(request).await?;
        debug!(table, rows = stored.len(), "Rows inserted");
        Ok(stored)
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        self.ensure_connected()?;
        check_identifier(table)?;
        query.check()?;

        let request = self
            .client
            .get(self.table_url(table))
            .query(&select_params(query));
        Self::send_for_rows(request).await
    }

    async fn update(&self, table: &str, patch: Row, filters: Row) -> Result<Vec<Row>, StoreError> {
        self.ensure_connected()?;
        check_identifier(table)?;
        check_row_keys(&patch)?;
        check_row_keys(&filters)?;
        if patch.is_empty() {
            return Err(StoreError::EmptyWrite);
        }
        if filters.is_empty() {
            return Err(StoreError::MissingFilter("update"));
        }

        let request = self
            .client
            .patch(self.table_url(table))
            .query(&filter_params(&filters))
            .json(&patch);
        Self::send_for_rows(request).await
    }

    async fn delete(&self, table: &str, filters: Row) -> Result<u64, StoreError> {
        self.ensure_connected()?;
        check_identifier(table)?;
        check_row_keys(&filters)?;
        if filters.is_empty() {
            return Err(StoreError::MissingFilter("delete"));
        }

        let request = self
            .client
            .delete(self.table_url(table))
            .query(&filter_params(&filters));
        let removed = Self::send_for_rows(request).await?;
        Ok(removed.len() as u64)
    }

    /// A missing table answers 404; any other failure is an error.
    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        self.ensure_connected()?;
        check_identifier(table)?;

        let response = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*"), ("limit", "1")])
            .send()
            .await
            .map_err(backend)?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Backend(format!("{status}: {body}")))
            }
        }
    }

    /// Column rows from the project's `get_table_info` function.
    async fn table_info(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        self.ensure_connected()?;
        check_identifier(table)?;

        match self.rpc("get_table_info", json!({ "table_name": table })).await? {
            Value::Null => Ok(Vec::new()),
            value => serde_json::from_value(value).map_err(|e| StoreError::Backend(e.to_string())),
        }
    }
}

#[async_trait]
impl DurableStore for SupabaseStore {
    /// Ping the REST endpoint. A missing health table still proves the
    /// credentials work.
    async fn connect(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .get(self.table_url(HEALTH_TABLE))
            .query(&[("select", "*"), ("limit", "1")])
            .send()
            .await
            .map_err(backend)?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            self.connected.store(true, Ordering::SeqCst);
            info!(url = %self.rest_url, "Durable store connected");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Backend(format!("{status}: {body}")))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(url = %self.rest_url, "Durable store disconnected");
        }
    }

    async fn run_migrations(&self, dir: &Path) -> Result<Vec<String>, StoreError> {
        self.ensure_connected()?;
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "No durable migrations directory, nothing to apply");
            return Ok(Vec::new());
        }

        self.ensure_migrations_table().await?;
        let applied = self.applied_migrations().await?;

        let mut ran = Vec::new();
        for (name, path) in pending_migrations(dir, &applied)? {
            let sql = fs::read_to_string(&path).map_err(|e| StoreError::Backend(e.to_string()))?;
            self.execute_sql(&sql).await.map_err(|e| {
                StoreError::Backend(format!("migration {name} failed: {e}"))
            })?;

            let mut record = Row::new();
            record.insert("name".to_string(), Value::String(name.clone()));
            self.insert(MIGRATIONS_TABLE, vec![record]).await?;

            info!(migration = %name, "Durable migration applied");
            ran.push(name);
        }
        Ok(ran)
    }
}
