//! Core traits and types for the caching system.

use serde::{Deserialize, Serialize};

/// A value as it is stored in the cache.
///
/// A stored failure is a present entry, so it can be told apart from a miss
/// (which the store reports as `None`) and from a successful empty payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum CacheSlot<T> {
  /// The upstream call succeeded with this payload.
  Success(T),
  /// The upstream call failed recently; don't retry until the entry expires.
  Failure,
}

/// Trait for query descriptions that map onto a cache key.
pub trait QueryKey {
  /// Ordered key components. Distinct queries must yield distinct components.
  fn cache_parts(&self) -> Vec<String>;

  /// Human-readable description for logging.
  fn description(&self) -> String;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_failure_is_distinct_from_empty_success() {
    let failure = serde_json::to_string(&CacheSlot::<Vec<u64>>::Failure).unwrap();
    let empty = serde_json::to_string(&CacheSlot::Success(Vec::<u64>::new())).unwrap();
    assert_ne!(failure, empty);

    let back: CacheSlot<Vec<u64>> = serde_json::from_str(&failure).unwrap();
    assert_eq!(back, CacheSlot::Failure);
    let back: CacheSlot<Vec<u64>> = serde_json::from_str(&empty).unwrap();
    assert_eq!(back, CacheSlot::Success(Vec::new()));
  }
}
