//! The shared backing store (second tier).

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use crate::error::{Error, Result};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default address of the backing store.
pub const DEFAULT_STORE_ADDRESS: &str = "redis://127.0.0.1:6379";

/// A byte-oriented key-value store shared by every cache instance.
///
/// `get` on an absent key must return [`Error::NotFound`] and nothing else,
/// so the cache can tell a miss apart from a failure.
#[async_trait]
pub trait Store: Send + Sync {
  async fn get(&self, key: &str) -> Result<Vec<u8>>;

  async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

  async fn delete(&self, key: &str) -> Result<()>;

  /// Removes every key.
  async fn clear(&self) -> Result<()>;

  async fn close(&self) -> Result<()>;
}

/// Connection settings for a networked store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub address: String,
  pub password: Option<String>,
  pub database: i64,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      address: DEFAULT_STORE_ADDRESS.to_string(),
      password: None,
      database: 0,
    }
  }
}

/// An in-process [`Store`].
///
/// Clones share the same data, so several caches in one process can act as
/// peers. Closing a handle only affects that handle.
#[derive(Debug, Default)]
pub struct MemoryStore {
  data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
  closed: AtomicBool,
}

impl Clone for MemoryStore {
  fn clone(&self) -> Self {
    Self {
      data: self.data.clone(),
      closed: AtomicBool::new(false),
    }
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of keys currently stored.
  pub fn len(&self) -> usize {
    self.data.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.read().is_empty()
  }

  fn ensure_open(&self) -> Result<()> {
    if self.closed.load(Ordering::Acquire) {
      Err(Error::Closed)
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get(&self, key: &str) -> Result<Vec<u8>> {
    self.ensure_open()?;
    self.data.read().get(key).cloned().ok_or(Error::NotFound)
  }

  async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
    self.ensure_open()?;
    self.data.write().insert(key.to_string(), value.to_vec());
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.ensure_open()?;
    self.data.write().remove(key);
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    self.ensure_open()?;
    self.data.write().clear();
    Ok(())
  }

  async fn close(&self) -> Result<()> {
    self.closed.store(true, Ordering::Release);
    Ok(())
  }
}
