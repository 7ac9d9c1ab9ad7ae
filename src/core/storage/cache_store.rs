// Local cache and session store port.

use super::record_store::{RecordStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;

/// One hour, the default lifetime of a cache entry.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Rows purged by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub cache: u64,
    pub settings: u64,
    pub sessions: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.cache + self.settings + self.sessions
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cache_entries: u64,
    pub settings: u64,
    pub sessions: u64,
    pub log_lines: u64,
    /// On-disk size of the database file.
    pub size_bytes: u64,
}

#[async_trait]
pub trait CacheStore: RecordStore {
    #[allow(dead_code)]
    async fn set_cache(&self, key: &str, value: &Value, ttl_secs: Option<u64>)
        -> Result<(), StoreError>;

    /// `None` when the key is absent or expired.
    #[allow(dead_code)]
    async fn get_cache(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set_setting(
        &self,
        guild_id: u64,
        key: &str,
        value: &Value,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError>;

    #[allow(dead_code)]
    async fn get_setting(&self, guild_id: u64, key: &str) -> Result<Option<Value>, StoreError>;

    #[allow(dead_code)]
    async fn set_session(&self, user_id: u64, data: &Value, ttl_secs: u64)
        -> Result<(), StoreError>;

    #[allow(dead_code)]
    async fn get_session(&self, user_id: u64) -> Result<Option<Value>, StoreError>;

    async fn append_log(
        &self,
        level: &str,
        message: &str,
        metadata: Option<&Value>,
    ) -> Result<(), StoreError>;

    /// Purge expired cache entries, settings and sessions.
    async fn cleanup(&self) -> Result<CleanupReport, StoreError>;

    async fn stats(&self) -> Result<CacheStats, StoreError>;

    /// Rebuild the database file to reclaim free pages.
    async fn vacuum(&self) -> Result<(), StoreError>;

    /// Close every connection. Later calls fail with a backend error.
    async fn close(&self);
}
