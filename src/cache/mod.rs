//! Generic caching layer in front of slow or unreliable upstream services.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Stores serialized values under composite keys with a per-entry TTL
//! - Records upstream failures as cached entries, distinct from misses
//! - Supports batched lookups for multi-entity requests
//! - Leaves expiry and eviction to the storage backend

mod layer;
mod storage;
mod traits;

pub use layer::{CacheLayer, ERROR_EXPIRY};
pub use storage::{CacheStore, ConfiguredStore, MemoryStore, NoopStore, SqliteStore};
pub use traits::{CacheSlot, QueryKey};
