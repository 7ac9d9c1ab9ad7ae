// Storage ports shared by the durable (remote) and cache (local) stores.
//
// Rows are plain JSON objects so handlers can persist whatever shape a table
// has without a schema type per table.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

pub type Row = Map<String, Value>;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not connected")]
    NotConnected,

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("{0} without filters would touch every row")]
    MissingFilter(&'static str),

    #[error("nothing to write")]
    EmptyWrite,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Tables and columns are interpolated into SQL and URLs, so only plain
/// identifiers are accepted.
pub fn check_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

pub fn check_row_keys(row: &Row) -> Result<(), StoreError> {
    row.keys().try_for_each(|key| check_identifier(key))
}

// ============================================================================
// QUERIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Equality filters plus optional projection, ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub columns: Vec<String>,
    pub filters: Row,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(column.into(), value.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn check(&self) -> Result<(), StoreError> {
        for column in &self.columns {
            check_identifier(column)?;
        }
        check_row_keys(&self.filters)?;
        if let Some(order) = &self.order_by {
            check_identifier(&order.column)?;
        }
        Ok(())
    }
}

// ============================================================================
// PORTS
// ============================================================================

/// Minimal CRUD contract both stores implement.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert rows and return them as stored.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError>;

    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError>;

    /// Apply `patch` to every row matching `filters`; returns the updated rows.
    #[allow(dead_code)]
    async fn update(&self, table: &str, patch: Row, filters: Row)
        -> Result<Vec<Row>, StoreError>;

    /// Delete every row matching `filters`; returns how many went.
    async fn delete(&self, table: &str, filters: Row) -> Result<u64, StoreError>;

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    /// One row per column, as the backend describes it. Empty for unknown tables.
    async fn table_info(&self, table: &str) -> Result<Vec<Row>, StoreError>;
}

/// The remote store. Must be connected before any CRUD call.
#[async_trait]
pub trait DurableStore: RecordStore {
    async fn connect(&self) -> Result<(), StoreError>;
    fn is_connected(&self) -> bool;

    /// Mark the store disconnected; later calls fail with `NotConnected`.
    fn disconnect(&self);

    /// Apply the `*.sql` files under `dir` that are not recorded yet, in name
    /// order. Returns the names applied by this call.
    async fn run_migrations(&self, dir: &Path) -> Result<Vec<String>, StoreError>;
}
