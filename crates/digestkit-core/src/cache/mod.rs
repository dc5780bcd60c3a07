//! Generic TTL key-value cache for memoized expensive computations.
//!
//! Expiry is pull-based: a read that finds an expired entry deletes it.
//! [`CacheStore::sweep`] reclaims entries nobody reads again.

mod model;
mod repository;

pub use model::{CacheEntry, DEFAULT_TTL};
pub use repository::CacheStore;
