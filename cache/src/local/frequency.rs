use super::batcher::ReadBuffer;
use super::tinylfu::{Admission, TinyLfu};
use super::{LocalCache, LocalCacheConfig, LocalCacheMetrics};
use crate::error::{Error, Result};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLock};

/// How often the maintenance thread drains buffered reads and writes.
const MAINTENANCE_TICK: Duration = Duration::from_millis(50);

type Shard<V> = CachePadded<RwLock<HashMap<String, Slot<V>, ahash::RandomState>>>;

struct Slot<V> {
  value: Arc<V>,
  cost: u64,
}

struct Inner<V> {
  shards: Box<[Shard<V>]>,
  shard_mask: usize,
  hasher: ahash::RandomState,

  // Lock order: policy, then a shard. Never the other way around.
  policy: Mutex<TinyLfu>,
  writes: Mutex<Vec<String>>,
  reads: ReadBuffer,

  max_cost: u64,
  buffer_items: usize,
  closed: AtomicBool,

  hits: CachePadded<AtomicU64>,
  misses: CachePadded<AtomicU64>,
  evictions: CachePadded<AtomicU64>,
}

impl<V> Inner<V> {
  #[inline]
  fn shard(&self, key: &str) -> &Shard<V> {
    let index = self.hasher.hash_one(key) as usize & self.shard_mask;
    &self.shards[index]
  }

  fn resident_cost(&self, key: &str) -> Option<u64> {
    self.shard(key).read().get(key).map(|slot| slot.cost)
  }

  fn remove_resident(&self, key: &str) {
    if self.shard(key).write().remove(key).is_some() {
      self.evictions.fetch_add(1, Ordering::Relaxed);
    }
  }

  /// Applies buffered reads and writes to the policy and enforces the cost
  /// bound. The caller holds the policy lock.
  fn maintain(&self, policy: &mut TinyLfu) {
    for (key, count) in self.reads.drain() {
      if policy.contains(&key) {
        policy.record_reads(&key, count);
      }
    }

    let writes = std::mem::take(&mut *self.writes.lock());
    for key in writes {
      // Deleted or replaced-and-evicted since it was buffered.
      let Some(cost) = self.resident_cost(&key) else {
        continue;
      };
      if let Admission::AdmitAndEvict(rejected) = policy.admit(&key, cost) {
        for victim in rejected {
          self.remove_resident(&victim);
        }
      }
    }

    let total = policy.total_cost();
    if total > self.max_cost {
      for (victim, _) in policy.evict(total - self.max_cost) {
        self.remove_resident(&victim);
      }
    }
  }

  /// Runs maintenance unless another thread already is.
  fn try_maintain(&self) {
    if let Some(mut policy) = self.policy.try_lock() {
      self.maintain(&mut policy);
    }
  }

  fn len(&self) -> u64 {
    self.shards.iter().map(|shard| shard.read().len() as u64).sum()
  }
}

struct Janitor {
  handle: JoinHandle<()>,
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  fn spawn<V: Send + Sync + 'static>(inner: Arc<Inner<V>>) -> Self {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop = stop_flag.clone();

    let handle = thread::spawn(move || {
      while !stop.load(Ordering::Acquire) {
        inner.try_maintain();
        thread::park_timeout(MAINTENANCE_TICK);
      }
    });

    Self { handle, stop_flag }
  }

  fn stop(self) {
    self.stop_flag.store(true, Ordering::Release);
    self.handle.thread().unpark();
    let _ = self.handle.join();
  }
}

/// An approximate-LFU local cache bounded by aggregate cost.
///
/// Values live in a sharded map and are visible to `get` as soon as `set`
/// returns. Admission and eviction are decided by a W-TinyLFU policy that
/// consumes buffered reads and writes on a background maintenance thread (or
/// inline, once `buffer_items` writes are pending). Until a write has been
/// processed the entry is resident but not yet counted against `max_cost`, and
/// the policy may still decide to drop it. Use [`FrequencyCache::flush`] to
/// apply everything pending.
pub struct FrequencyCache<V> {
  inner: Arc<Inner<V>>,
  janitor: Mutex<Option<Janitor>>,
}

impl<V> fmt::Debug for FrequencyCache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FrequencyCache")
      .field("max_cost", &self.inner.max_cost)
      .field("shards", &self.inner.shards.len())
      .field("closed", &self.inner.closed.load(Ordering::Relaxed))
      .finish()
  }
}

impl<V: Send + Sync + 'static> FrequencyCache<V> {
  pub fn new(config: &LocalCacheConfig) -> Result<Self> {
    if config.num_counters == 0 {
      return Err(Error::InvalidConfig("num_counters must be greater than zero".into()));
    }
    if config.max_cost == 0 {
      return Err(Error::InvalidConfig("max_cost must be greater than zero".into()));
    }

    let shard_count = (num_cpus::get() * 4).max(1).next_power_of_two();
    let hasher = ahash::RandomState::new();
    let shards = (0..shard_count)
      .map(|_| CachePadded::new(RwLock::new(HashMap::with_hasher(hasher.clone()))))
      .collect();

    let inner = Arc::new(Inner {
      shards,
      shard_mask: shard_count - 1,
      hasher,
      policy: Mutex::new(TinyLfu::new(config.max_cost, config.num_counters)),
      writes: Mutex::new(Vec::new()),
      reads: ReadBuffer::new(config.buffer_items.max(1) * 64),
      max_cost: config.max_cost,
      buffer_items: config.buffer_items.max(1),
      closed: AtomicBool::new(false),
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      evictions: CachePadded::new(AtomicU64::new(0)),
    });

    let janitor = Janitor::spawn(inner.clone());

    Ok(Self {
      inner,
      janitor: Mutex::new(Some(janitor)),
    })
  }

  /// Applies every pending read and write to the admission policy and
  /// enforces the cost bound before returning.
  pub fn flush(&self) {
    let mut policy = self.inner.policy.lock();
    self.inner.maintain(&mut policy);
  }

  fn stop_janitor(&self) {
    if let Some(janitor) = self.janitor.lock().take() {
      janitor.stop();
    }
  }
}

impl<V: Send + Sync + 'static> LocalCache<V> for FrequencyCache<V> {
  fn get(&self, key: &str) -> Option<Arc<V>> {
    let found = self.inner.shard(key).read().get(key).map(|slot| slot.value.clone());
    match found {
      Some(value) => {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        self.inner.reads.record(key);
        Some(value)
      }
      None => {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  fn set(&self, key: String, value: Arc<V>, cost: u64) -> bool {
    if cost > self.inner.max_cost || self.inner.closed.load(Ordering::Acquire) {
      return false;
    }

    self.inner.shard(&key).write().insert(key.clone(), Slot { value, cost });

    let pending = {
      let mut writes = self.inner.writes.lock();
      writes.push(key);
      writes.len()
    };
    if pending >= self.inner.buffer_items {
      self.inner.try_maintain();
    }
    true
  }

  fn delete(&self, key: &str) {
    let mut policy = self.inner.policy.lock();
    self.inner.shard(key).write().remove(key);
    policy.remove(key);
  }

  fn clear(&self) {
    let mut policy = self.inner.policy.lock();
    self.inner.writes.lock().clear();
    self.inner.reads.clear();
    for shard in self.inner.shards.iter() {
      shard.write().clear();
    }
    policy.clear();
  }

  fn close(&self) {
    self.inner.closed.store(true, Ordering::Release);
    self.stop_janitor();
    self.clear();
  }

  fn metrics(&self) -> LocalCacheMetrics {
    LocalCacheMetrics {
      hits: self.inner.hits.load(Ordering::Relaxed),
      misses: self.inner.misses.load(Ordering::Relaxed),
      evictions: self.inner.evictions.load(Ordering::Relaxed),
      size: self.inner.len(),
    }
  }
}

impl<V> Drop for FrequencyCache<V> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.get_mut().take() {
      janitor.stop();
    }
  }
}
