use super::{LocalCache, LocalCacheMetrics};
use crate::error::{Error, Result};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::IteratorRandom;

/// A locked map that evicts a random entry when a new key arrives at
/// capacity.
#[derive(Debug)]
pub struct MapCache<V> {
  // Overwriting an existing key never evicts.
  items: RwLock<HashMap<String, Arc<V>>>,
  max_size: usize,
  hits: AtomicU64,
  misses: AtomicU64,
  evictions: AtomicU64,
}

impl<V> MapCache<V> {
  pub fn new(max_size: usize) -> Result<Self> {
    if max_size == 0 {
      return Err(Error::InvalidConfig("max_size must be greater than zero".into()));
    }
    Ok(Self {
      items: RwLock::new(HashMap::with_capacity(max_size.min(1024))),
      max_size,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      evictions: AtomicU64::new(0),
    })
  }
}

impl<V: Send + Sync> LocalCache<V> for MapCache<V> {
  fn get(&self, key: &str) -> Option<Arc<V>> {
    let found = self.items.read().get(key).cloned();
    let counter = if found.is_some() { &self.hits } else { &self.misses };
    counter.fetch_add(1, Ordering::Relaxed);
    found
  }

  fn set(&self, key: String, value: Arc<V>, _cost: u64) -> bool {
    let mut items = self.items.write();
    if !items.contains_key(&key) && items.len() >= self.max_size {
      let victim = items.keys().choose(&mut rand::rng()).cloned();
      if let Some(victim) = victim {
        items.remove(&victim);
        self.evictions.fetch_add(1, Ordering::Relaxed);
      }
    }
    items.insert(key, value);
    true
  }

  fn delete(&self, key: &str) {
    self.items.write().remove(key);
  }

  fn clear(&self) {
    self.items.write().clear();
  }

  fn close(&self) {
    self.clear();
  }

  fn metrics(&self) -> LocalCacheMetrics {
    LocalCacheMetrics {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      size: self.items.read().len() as u64,
    }
  }
}
