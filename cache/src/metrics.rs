use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Lock-free counters for one `SyncedCache`.
#[derive(Debug, Default)]
pub(crate) struct Stats {
  pub(crate) local_hits: CachePadded<AtomicU64>,
  pub(crate) local_misses: CachePadded<AtomicU64>,
  pub(crate) remote_hits: CachePadded<AtomicU64>,
  pub(crate) remote_misses: CachePadded<AtomicU64>,
  /// Keys dropped because of peer events.
  pub(crate) invalidations: CachePadded<AtomicU64>,
}

impl Stats {
  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self, local_size: u64) -> StatsSnapshot {
    StatsSnapshot {
      local_hits: self.local_hits.load(Ordering::Relaxed),
      local_misses: self.local_misses.load(Ordering::Relaxed),
      remote_hits: self.remote_hits.load(Ordering::Relaxed),
      remote_misses: self.remote_misses.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      local_size,
    }
  }
}

/// A point-in-time copy of a cache's counters.
///
/// Each counter is read atomically, but the snapshot as a whole is not taken
/// under a lock.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
  /// Lookups answered by the local cache.
  pub local_hits: u64,
  pub local_misses: u64,
  /// Local misses answered by the backing store.
  pub remote_hits: u64,
  /// Local misses the backing store could not answer either.
  pub remote_misses: u64,
  /// Peer invalidate, delete and clear events applied locally.
  pub invalidations: u64,
  /// Entries currently resident in the local cache.
  pub local_size: u64,
}

impl StatsSnapshot {
  /// Fraction of lookups served without leaving the process.
  pub fn local_hit_ratio(&self) -> f64 {
    let total = self.local_hits + self.local_misses;
    if total == 0 {
      0.0
    } else {
      self.local_hits as f64 / total as f64
    }
  }
}

impl fmt::Debug for StatsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StatsSnapshot")
      .field("local_hits", &self.local_hits)
      .field("local_misses", &self.local_misses)
      .field("local_hit_ratio", &format!("{:.2}%", self.local_hit_ratio() * 100.0))
      .field("remote_hits", &self.remote_hits)
      .field("remote_misses", &self.remote_misses)
      .field("invalidations", &self.invalidations)
      .field("local_size", &self.local_size)
      .finish()
  }
}
