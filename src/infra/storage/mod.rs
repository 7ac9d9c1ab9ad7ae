pub mod sqlite_cache_store;
pub mod supabase_store;

pub use sqlite_cache_store::SqliteCacheStore;
pub use supabase_store::SupabaseStore;
