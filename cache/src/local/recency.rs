use super::lru_list::LruList;
use super::{LocalCache, LocalCacheMetrics};
use crate::error::{Error, Result};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// An exact least-recently-used local cache bounded by item count.
///
/// Every operation takes effect before it returns. `cost` is accepted for
/// interface compatibility and ignored: each entry counts as one item.
pub struct RecencyCache<V> {
  list: Mutex<LruList<String, Arc<V>>>,
  max_size: usize,
  hits: AtomicU64,
  misses: AtomicU64,
  evictions: AtomicU64,
}

impl<V> fmt::Debug for RecencyCache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecencyCache")
      .field("max_size", &self.max_size)
      .field("len", &self.list.lock().len())
      .finish()
  }
}

impl<V> RecencyCache<V> {
  pub fn new(max_size: usize) -> Result<Self> {
    if max_size == 0 {
      return Err(Error::InvalidConfig("max_size must be greater than zero".into()));
    }
    Ok(Self {
      list: Mutex::new(LruList::new()),
      max_size,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      evictions: AtomicU64::new(0),
    })
  }
}

impl<V: Send + Sync> LocalCache<V> for RecencyCache<V> {
  fn get(&self, key: &str) -> Option<Arc<V>> {
    let found = self.list.lock().touch(key).cloned();
    let counter = if found.is_some() { &self.hits } else { &self.misses };
    counter.fetch_add(1, Ordering::Relaxed);
    found
  }

  fn set(&self, key: String, value: Arc<V>, _cost: u64) -> bool {
    let mut list = self.list.lock();
    list.push_front(key, value, 1);
    while list.len() > self.max_size {
      if list.pop_back().is_none() {
        break;
      }
      self.evictions.fetch_add(1, Ordering::Relaxed);
    }
    true
  }

  fn delete(&self, key: &str) {
    self.list.lock().remove(key);
  }

  fn clear(&self) {
    self.list.lock().clear();
  }

  fn close(&self) {
    self.clear();
  }

  fn metrics(&self) -> LocalCacheMetrics {
    LocalCacheMetrics {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      size: self.list.lock().len() as u64,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_size_is_invalid() {
    assert!(matches!(RecencyCache::<i32>::new(0), Err(Error::InvalidConfig(_))));
  }

  #[test]
  fn evicts_least_recently_used() {
    let cache = RecencyCache::new(2).unwrap();
    cache.set("a".into(), Arc::new(1), 1);
    cache.set("b".into(), Arc::new(2), 1);
    cache.get("a");
    cache.set("c".into(), Arc::new(3), 1);

    assert_eq!(cache.get("a"), Some(Arc::new(1)));
    assert!(cache.get("b").is_none());
    assert_eq!(cache.get("c"), Some(Arc::new(3)));
    assert_eq!(cache.metrics().evictions, 1);
  }

  #[test]
  fn overwrite_does_not_grow() {
    let cache = RecencyCache::new(2).unwrap();
    cache.set("a".into(), Arc::new(1), 1);
    cache.set("a".into(), Arc::new(2), 1);
    assert_eq!(cache.metrics().size, 1);
    assert_eq!(cache.get("a"), Some(Arc::new(2)));
  }

  #[test]
  fn cost_is_ignored() {
    let cache = RecencyCache::new(2).unwrap();
    assert!(cache.set("a".into(), Arc::new(1), 1_000_000));
    assert!(cache.set("b".into(), Arc::new(2), 1_000_000));
    assert_eq!(cache.metrics().size, 2);
  }

  #[test]
  fn delete_clear_and_metrics() {
    let cache = RecencyCache::new(4).unwrap();
    cache.set("a".into(), Arc::new(1), 1);
    cache.set("b".into(), Arc::new(2), 1);
    cache.delete("a");
    assert!(cache.get("a").is_none());
    cache.get("b");

    let metrics = cache.metrics();
    assert_eq!((metrics.hits, metrics.misses, metrics.size), (1, 1, 1));

    cache.close();
    assert_eq!(cache.metrics().size, 0);
  }
}
