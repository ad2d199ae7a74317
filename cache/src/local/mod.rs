//! The in-process tier: a bounded, concurrent key→value store with a
//! pluggable eviction policy.
//!
//! Three implementations ship with the crate:
//!
//! - [`FrequencyCache`]: approximate LFU (W-TinyLFU admission), bounded by
//!   aggregate cost, admission and eviction applied asynchronously.
//! - [`RecencyCache`]: exact LRU, bounded by item count, every operation
//!   immediately visible.
//! - [`MapCache`]: a plain locked map with random eviction. Useful as a
//!   deterministic test double and as a template for custom policies.
//!
//! Custom policies implement [`LocalCache`] and are plugged in through a
//! [`LocalCacheFactory`].

mod batcher;
mod frequency;
mod lru_list;
#[cfg(feature = "random")]
mod random;
mod recency;
mod sketch;
mod tinylfu;

pub use frequency::FrequencyCache;
#[cfg(feature = "random")]
pub use random::MapCache;
pub use recency::RecencyCache;

use crate::error::Result;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The capability set every local cache provides.
///
/// Implementations must be safe to call concurrently from application tasks
/// and from the synchronizer's background task.
pub trait LocalCache<V>: Send + Sync {
  fn get(&self, key: &str) -> Option<Arc<V>>;

  /// Stores `value` with the given eviction `cost`. Returns `false` if the
  /// policy refused the entry outright.
  fn set(&self, key: String, value: Arc<V>, cost: u64) -> bool;

  fn delete(&self, key: &str);

  fn clear(&self);

  /// Releases background resources. The cache is empty afterwards.
  fn close(&self);

  fn metrics(&self) -> LocalCacheMetrics;
}

/// Counters reported by a local cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalCacheMetrics {
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
  /// Number of resident entries.
  pub size: u64,
}

/// Produces the local cache a `SyncedCache` will own.
pub trait LocalCacheFactory<V>: Send + Sync {
  fn create(&self) -> Result<Box<dyn LocalCache<V>>>;
}

impl<V, F> LocalCacheFactory<V> for F
where
  F: Fn() -> Result<Box<dyn LocalCache<V>>> + Send + Sync,
{
  fn create(&self) -> Result<Box<dyn LocalCache<V>>> {
    self()
  }
}

/// Sizing for the built-in local caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
  /// Number of counters in the frequency sketch (frequency policy). About ten
  /// times the expected number of resident items works well.
  pub num_counters: usize,
  /// Maximum aggregate cost of resident entries (frequency policy).
  pub max_cost: u64,
  /// Pending writes that trigger an inline maintenance pass (frequency policy).
  pub buffer_items: usize,
  /// Maximum number of entries (recency and map policies).
  pub max_size: usize,
}

impl Default for LocalCacheConfig {
  fn default() -> Self {
    Self {
      num_counters: 1_000_000,
      max_cost: 1 << 30,
      buffer_items: 64,
      max_size: 10_000,
    }
  }
}

/// Creates [`FrequencyCache`] instances. This is the default factory.
#[derive(Debug, Clone)]
pub struct FrequencyCacheFactory {
  config: LocalCacheConfig,
}

impl FrequencyCacheFactory {
  pub fn new(config: LocalCacheConfig) -> Self {
    Self { config }
  }
}

impl<V: Send + Sync + 'static> LocalCacheFactory<V> for FrequencyCacheFactory {
  fn create(&self) -> Result<Box<dyn LocalCache<V>>> {
    Ok(Box::new(FrequencyCache::new(&self.config)?))
  }
}

/// Creates [`RecencyCache`] instances holding at most `max_size` entries.
#[derive(Debug, Clone, Copy)]
pub struct RecencyCacheFactory {
  max_size: usize,
}

impl RecencyCacheFactory {
  pub fn new(max_size: usize) -> Self {
    Self { max_size }
  }

  /// Uses `config.max_size`.
  pub fn from_config(config: &LocalCacheConfig) -> Self {
    Self::new(config.max_size)
  }
}

impl<V: Send + Sync + 'static> LocalCacheFactory<V> for RecencyCacheFactory {
  fn create(&self) -> Result<Box<dyn LocalCache<V>>> {
    Ok(Box::new(RecencyCache::new(self.max_size)?))
  }
}

/// Creates [`MapCache`] instances holding at most `max_size` entries.
#[cfg(feature = "random")]
#[derive(Debug, Clone, Copy)]
pub struct MapCacheFactory {
  max_size: usize,
}

#[cfg(feature = "random")]
impl MapCacheFactory {
  pub fn new(max_size: usize) -> Self {
    Self { max_size }
  }

  pub fn from_config(config: &LocalCacheConfig) -> Self {
    Self::new(config.max_size)
  }
}

#[cfg(feature = "random")]
impl<V: Send + Sync + 'static> LocalCacheFactory<V> for MapCacheFactory {
  fn create(&self) -> Result<Box<dyn LocalCache<V>>> {
    Ok(Box::new(MapCache::new(self.max_size)?))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn closures_are_factories() {
    let factory = || -> Result<Box<dyn LocalCache<i32>>> { Ok(Box::new(RecencyCache::<i32>::new(4)?)) };
    let cache = LocalCacheFactory::create(&factory).unwrap();
    assert!(cache.set("a".to_string(), Arc::new(1), 1));
    assert_eq!(cache.get("a"), Some(Arc::new(1)));
  }

  #[test]
  fn recency_factory_rejects_zero_size() {
    let result = <RecencyCacheFactory as LocalCacheFactory<i32>>::create(&RecencyCacheFactory::new(0));
    assert!(result.is_err());
  }

  #[test]
  fn recency_factory_reads_max_size_from_config() {
    let config = LocalCacheConfig {
      max_size: 2,
      ..LocalCacheConfig::default()
    };
    let cache = <RecencyCacheFactory as LocalCacheFactory<i32>>::create(&RecencyCacheFactory::from_config(&config)).unwrap();
    for i in 0..5 {
      cache.set(format!("k{i}"), Arc::new(i), 1);
    }
    assert_eq!(cache.metrics().size, 2);
  }

  #[test]
  fn frequency_factory_uses_config() {
    let config = LocalCacheConfig {
      num_counters: 1_000,
      max_cost: 100,
      ..LocalCacheConfig::default()
    };
    let cache = <FrequencyCacheFactory as LocalCacheFactory<String>>::create(&FrequencyCacheFactory::new(config)).unwrap();
    assert!(!cache.set("huge".to_string(), Arc::new("x".to_string()), 101));
    assert!(cache.set("small".to_string(), Arc::new("y".to_string()), 1));
    cache.close();
  }
}
