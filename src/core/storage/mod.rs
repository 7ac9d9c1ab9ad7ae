// Storage ports. Implementations live in `infra/`.

pub mod cache_store;
pub mod record_store;

pub use cache_store::*;
pub use record_store::*;
