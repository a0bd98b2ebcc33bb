pub mod cache;
pub mod db;
pub mod rate;

pub use cache::{CacheEntry, CacheValue, LookupCache};
pub use db::{open_store, open_store_in_memory, StoreError, StorePool, SCHEMA_VERSION};
pub use rate::{daily_count, try_increment_daily};
