use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

const STRIPES: usize = 16; // Power of two for masking.

type Stripe = Mutex<HashMap<String, u32>>;

/// Striped, double-buffered, coalescing buffer of read events.
///
/// Readers lock a single stripe of the active buffer set and bump the read
/// count for their key. The maintenance thread flips the active set and
/// drains the inactive one, so readers never wait on a drain. Reads that
/// arrive while a stripe is full are dropped; the frequency sketch is an
/// estimate anyway.
pub(crate) struct ReadBuffer {
  active: AtomicUsize,
  sets: [Box<[Stripe]>; 2],
  hasher: ahash::RandomState,
  stripe_capacity: usize,
}

impl ReadBuffer {
  pub(crate) fn new(capacity: usize) -> Self {
    let make_set = || -> Box<[Stripe]> {
      (0..STRIPES).map(|_| Mutex::new(HashMap::new())).collect()
    };
    Self {
      active: AtomicUsize::new(0),
      sets: [make_set(), make_set()],
      hasher: ahash::RandomState::new(),
      stripe_capacity: (capacity / STRIPES).max(8),
    }
  }

  #[inline]
  pub(crate) fn record(&self, key: &str) {
    let set = &self.sets[self.active.load(Ordering::Relaxed)];
    let stripe = self.hasher.hash_one(key) as usize & (STRIPES - 1);

    // Never block the read path on a contended stripe.
    let Some(mut guard) = set[stripe].try_lock() else {
      return;
    };
    if let Some(count) = guard.get_mut(key) {
      *count = count.saturating_add(1);
    } else if guard.len() < self.stripe_capacity {
      guard.insert(key.to_string(), 1);
    }
  }

  /// Swaps the active set and returns everything recorded in the old one.
  pub(crate) fn drain(&self) -> HashMap<String, u32> {
    let drained_idx = self.active.fetch_xor(1, Ordering::AcqRel);
    let mut batch = HashMap::new();
    for stripe in self.sets[drained_idx].iter() {
      let mut guard = stripe.lock();
      if !guard.is_empty() {
        batch.extend(std::mem::take(&mut *guard));
      }
    }
    batch
  }

  pub(crate) fn clear(&self) {
    for set in &self.sets {
      for stripe in set.iter() {
        stripe.lock().clear();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_are_coalesced_per_key() {
    let buffer = ReadBuffer::new(256);
    buffer.record("a");
    buffer.record("a");
    buffer.record("b");

    let batch = buffer.drain();
    assert_eq!(batch.get("a"), Some(&2));
    assert_eq!(batch.get("b"), Some(&1));
    assert!(buffer.drain().is_empty());
  }

  #[test]
  fn drain_flips_between_buffer_sets() {
    let buffer = ReadBuffer::new(256);
    buffer.record("first");
    assert_eq!(buffer.drain().len(), 1);

    buffer.record("second");
    let batch = buffer.drain();
    assert_eq!(batch.len(), 1);
    assert!(batch.contains_key("second"));
  }
}
