//! Cache storage trait and its backends.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Trait for key-value cache backends.
///
/// Expiry is enforced by the store: an expired entry reads as a miss.
pub trait CacheStore: Send + Sync {
  /// Build a key from its components. Components are escaped so that
  /// distinct component lists never produce the same key.
  fn make_key(&self, parts: &[&str]) -> String {
    parts
      .iter()
      .map(|part| url::form_urlencoded::byte_serialize(part.as_bytes()).collect::<String>())
      .collect::<Vec<_>>()
      .join(":")
  }

  /// Get a value, `None` on a miss.
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;

  /// Get several values at once. Only present keys appear in the result.
  fn get_multi<T: DeserializeOwned>(&self, keys: &[String]) -> Result<HashMap<String, T>>;

  /// Store a value for `ttl`, replacing any existing entry.
  fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;
}

/// Decode a stored value; undecodable entries are treated as misses.
fn decode<T: DeserializeOwned>(key: &str, data: &[u8]) -> Option<T> {
  match serde_json::from_slice(data) {
    Ok(value) => Some(value),
    Err(e) => {
      warn!(key, error = %e, "Ignoring undecodable cache entry");
      None
    }
  }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
  serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - every read is a miss.
pub struct NoopStore;

impl CacheStore for NoopStore {
  fn get<T: DeserializeOwned>(&self, _key: &str) -> Result<Option<T>> {
    Ok(None) // Always miss
  }

  fn get_multi<T: DeserializeOwned>(&self, _keys: &[String]) -> Result<HashMap<String, T>> {
    Ok(HashMap::new())
  }

  fn set<T: Serialize>(&self, _key: &str, _value: &T, _ttl: Duration) -> Result<()> {
    Ok(()) // Discard
  }
}

/// Process-local cache, mostly useful for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lookup<T: DeserializeOwned>(
    entries: &HashMap<String, (Vec<u8>, Instant)>,
    key: &str,
    now: Instant,
  ) -> Option<T> {
    entries
      .get(key)
      .filter(|(_, expires_at)| *expires_at > now)
      .and_then(|(data, _)| decode(key, data))
  }
}

impl CacheStore for MemoryStore {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(Self::lookup(&entries, key, Instant::now()))
  }

  fn get_multi<T: DeserializeOwned>(&self, keys: &[String]) -> Result<HashMap<String, T>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let now = Instant::now();
    Ok(
      keys
        .iter()
        .filter_map(|key| Self::lookup(&entries, key, now).map(|value| (key.clone(), value)))
        .collect(),
    )
  }

  fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
    let data = encode(value)?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let now = Instant::now();
    entries.retain(|_, (_, expires_at)| *expires_at > now);
    entries.insert(key.to_string(), (data, now + ttl));
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the cache database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    storage.purge_expired()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pvi").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// Drop expired rows so the file does not grow without bound.
  pub fn purge_expired(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM kv_cache WHERE expires_at <= ?",
        params![Utc::now().timestamp()],
      )
      .map_err(|e| eyre!("Failed to purge expired cache entries: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Serialized cache entries (JSON) with absolute expiry in unix seconds
CREATE TABLE IF NOT EXISTS kv_cache (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kv_cache_expires ON kv_cache(expires_at);
"#;

impl CacheStore for SqliteStore {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM kv_cache WHERE cache_key = ? AND expires_at > ?",
        params![key, Utc::now().timestamp()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    Ok(data.and_then(|data| decode(key, &data)))
  }

  fn get_multi<T: DeserializeOwned>(&self, keys: &[String]) -> Result<HashMap<String, T>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let now = Utc::now().timestamp();

    let mut stmt = conn
      .prepare_cached("SELECT data FROM kv_cache WHERE cache_key = ? AND expires_at > ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let mut found = HashMap::new();
    for key in keys {
      let data: Option<Vec<u8>> = stmt
        .query_row(params![key, now], |row| row.get(0))
        .optional()
        .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

      if let Some(value) = data.and_then(|data| decode(key, &data)) {
        found.insert(key.clone(), value);
      }
    }

    Ok(found)
  }

  fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
    let data = encode(value)?;
    let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_cache (cache_key, data, expires_at) VALUES (?, ?, ?)",
        params![key, data, expires_at],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }
}

/// Store picked at startup from configuration.
pub enum ConfiguredStore {
  Sqlite(SqliteStore),
  Disabled(NoopStore),
}

impl CacheStore for ConfiguredStore {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    match self {
      Self::Sqlite(store) => store.get(key),
      Self::Disabled(store) => store.get(key),
    }
  }

  fn get_multi<T: DeserializeOwned>(&self, keys: &[String]) -> Result<HashMap<String, T>> {
    match self {
      Self::Sqlite(store) => store.get_multi(keys),
      Self::Disabled(store) => store.get_multi(keys),
    }
  }

  fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
    match self {
      Self::Sqlite(store) => store.set(key, value, ttl),
      Self::Disabled(store) => store.set(key, value, ttl),
    }
  }
}
