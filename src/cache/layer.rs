//! Cache layer that orchestrates caching logic with upstream fetching.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::storage::CacheStore;
use super::traits::{CacheSlot, QueryKey};
use crate::status::{Message, Status};

/// How long a failed upstream call is remembered before it is retried.
pub const ERROR_EXPIRY: Duration = Duration::from_secs(1800);

/// Cache layer that manages cache slots and upstream fetching.
///
/// This layer sits between a service and its storage backend. It never
/// checks timestamps itself; expiry is delegated to the store.
pub struct CacheLayer<S: CacheStore> {
  storage: Arc<S>,
  /// How long failures are cached
  error_expiry: Duration,
}

impl<S: CacheStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      error_expiry: ERROR_EXPIRY,
    }
  }

  pub fn error_expiry(&self) -> Duration {
    self.error_expiry
  }

  /// Storage key for a query.
  pub fn key(&self, query: &impl QueryKey) -> String {
    let parts = query.cache_parts();
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
    self.storage.make_key(&parts)
  }

  /// Look up one slot.
  pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheSlot<T>>> {
    self.storage.get(key)
  }

  /// Look up many slots at once; misses are absent from the result.
  pub fn lookup_many<T: DeserializeOwned>(
    &self,
    keys: &[String],
  ) -> Result<HashMap<String, CacheSlot<T>>> {
    self.storage.get_multi(keys)
  }

  pub fn store_success<T: Serialize>(&self, key: &str, value: &T, expiry: Duration) -> Result<()> {
    self.storage.set(key, &CacheSlot::Success(value), expiry)
  }

  pub fn store_failure(&self, key: &str) -> Result<()> {
    self
      .storage
      .set(key, &CacheSlot::<()>::Failure, self.error_expiry)
  }

  /// Fetch a value with cache-first strategy.
  ///
  /// 1. Cached payload: return it as a good status
  /// 2. Cached failure: return a failed status with a generic cached-error message
  /// 3. Miss: call `fetcher`, cache the payload for `expiry()` on success or a
  ///    failure marker for [`ERROR_EXPIRY`] otherwise, and return the fetched
  ///    status unchanged so the real error is visible the first time
  pub async fn fetch<K, T, E, F, Fut>(&self, query: &K, expiry: E, fetcher: F) -> Result<Status<T>>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned + Default,
    E: FnOnce() -> Duration,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Status<T>>>,
  {
    let key = self.key(query);

    match self.lookup::<T>(&key)? {
      Some(CacheSlot::Success(data)) => {
        debug!(query = %query.description(), "Cache hit");
        Ok(Status::good(data))
      }
      Some(CacheSlot::Failure) => {
        debug!(query = %query.description(), "Cached failure");
        Ok(Status::fatal(
          T::default(),
          Message::cached_error(self.error_expiry),
        ))
      }
      None => {
        debug!(query = %query.description(), "Cache miss");
        let status = fetcher().await?;
        if status.is_ok() {
          self.store_success(&key, status.value(), expiry())?;
        } else {
          self.store_failure(&key)?;
        }
        Ok(status)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::status::codes;
  use color_eyre::eyre::eyre;
  use std::cell::Cell;

  struct TestKey(&'static str);

  impl QueryKey for TestKey {
    fn cache_parts(&self) -> Vec<String> {
      vec!["test".to_string(), self.0.to_string()]
    }

    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  const HOUR: Duration = Duration::from_secs(3600);

  #[tokio::test]
  async fn test_fetch_caches_success() {
    let layer = CacheLayer::new(MemoryStore::new());
    let calls = Cell::new(0);
    let fetch = || async {
      calls.set(calls.get() + 1);
      Ok(Status::good(vec![1u64, 2]))
    };

    let status = layer.fetch(&TestKey("a"), || HOUR, fetch).await.unwrap();
    assert!(status.is_good());
    assert_eq!(status.value(), &vec![1, 2]);

    let status = layer.fetch(&TestKey("a"), || HOUR, fetch).await.unwrap();
    assert_eq!(status.value(), &vec![1, 2]);
    assert_eq!(calls.get(), 1);
  }

  #[tokio::test]
  async fn test_fetch_replays_cached_failure() {
    let layer = CacheLayer::new(MemoryStore::new());
    let failing = || async {
      Ok(Status::fatal(
        Vec::<u64>::new(),
        Message::bad_status(500),
      ))
    };

    let status = layer.fetch(&TestKey("a"), || HOUR, failing).await.unwrap();
    assert!(!status.is_ok());
    assert!(status.has_message(codes::HTTP_BAD_STATUS));
    assert!(!status.has_message(codes::CACHED_ERROR));

    let status = layer
      .fetch(&TestKey("a"), || HOUR, || async {
        Err::<Status<Vec<u64>>, _>(eyre!("should have been cached"))
      })
      .await
      .unwrap();
    assert!(!status.is_ok());
    assert!(!status.has_message(codes::HTTP_BAD_STATUS));
    assert!(status.has_message(codes::CACHED_ERROR));
  }

  #[tokio::test]
  async fn test_empty_success_is_not_a_failure() {
    let layer = CacheLayer::new(MemoryStore::new());
    layer
      .fetch(&TestKey("a"), || HOUR, || async {
        Ok(Status::good(Vec::<u64>::new()))
      })
      .await
      .unwrap();

    let key = layer.key(&TestKey("a"));
    assert_eq!(
      layer.lookup::<Vec<u64>>(&key).unwrap(),
      Some(CacheSlot::Success(Vec::new()))
    );
  }
}
