use super::lru_list::LruList;
use super::sketch::CountMinSketch;

/// Outcome of offering a written key to the admission policy.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
  Admit,
  /// The key was admitted but window overflow candidates lost against the
  /// main segment and must leave the cache.
  AdmitAndEvict(Vec<String>),
}

/// W-TinyLFU bookkeeping: a small window LRU in front of a segmented LRU
/// (probationary + protected), with a count-min sketch deciding which window
/// overflow candidates deserve a place in the main segment.
///
/// Not synchronized; `FrequencyCache` keeps it behind a mutex.
#[derive(Debug)]
pub(crate) struct TinyLfu {
  window: LruList<String>,
  probationary: LruList<String>,
  protected: LruList<String>,
  sketch: CountMinSketch,
  window_capacity: u64,
  main_capacity: u64,
  protected_capacity: u64,
}

impl TinyLfu {
  pub(crate) fn new(max_cost: u64, num_counters: usize) -> Self {
    // The window is ~1% of the cache, the rest is the main segment.
    let window_capacity = if max_cost == 0 {
      0
    } else {
      ((max_cost as f64 * 0.01).round() as u64).max(1)
    };
    let main_capacity = max_cost.saturating_sub(window_capacity);

    // Protected gets 80% of the main segment.
    let protected_capacity = if main_capacity == 0 {
      0
    } else {
      let probationary = ((main_capacity as f64 * 0.20).round() as u64).max(1);
      main_capacity.saturating_sub(probationary)
    };

    let sample_size = num_counters.max(100).saturating_mul(10);

    Self {
      window: LruList::new(),
      probationary: LruList::new(),
      protected: LruList::new(),
      sketch: CountMinSketch::new(num_counters, sample_size),
      window_capacity,
      main_capacity,
      protected_capacity,
    }
  }

  /// Total cost of every key currently tracked.
  pub(crate) fn total_cost(&self) -> u64 {
    self.window.total_cost() + self.probationary.total_cost() + self.protected.total_cost()
  }

  pub(crate) fn contains(&self, key: &str) -> bool {
    self.window.contains(key) || self.probationary.contains(key) || self.protected.contains(key)
  }

  /// Records `count` reads of `key`.
  pub(crate) fn record_reads(&mut self, key: &str, count: u32) {
    for _ in 0..count.min(u8::MAX as u32) {
      self.sketch.increment(key);
    }
    if self.window.contains(key) {
      self.window.touch(key);
    } else if self.protected.contains(key) {
      self.protected.touch(key);
    } else if let Some(((), cost)) = self.probationary.remove(key) {
      self.promote(key.to_string(), cost);
    }
  }

  /// Offers a written key to the policy.
  pub(crate) fn admit(&mut self, key: &str, cost: u64) -> Admission {
    self.sketch.increment(key);

    if self.protected.contains(key) {
      self.protected.push_front(key.to_string(), (), cost);
      self.maintain_protected();
      return Admission::Admit;
    }
    if self.probationary.remove(key).is_some() {
      self.promote(key.to_string(), cost);
      return Admission::Admit;
    }

    self.window.push_front(key.to_string(), (), cost);

    let mut rejected = Vec::new();
    while self.window.total_cost() > self.window_capacity {
      let Some((candidate, (), candidate_cost)) = self.window.pop_back() else {
        break;
      };

      // Frequencies only compete once the main segment is full.
      let main_cost = self.probationary.total_cost() + self.protected.total_cost();
      let admit_candidate = if main_cost + candidate_cost <= self.main_capacity {
        true
      } else {
        match self.main_victim() {
          Some(victim) => self.sketch.estimate(&candidate) >= self.sketch.estimate(victim),
          None => true,
        }
      };

      if admit_candidate {
        self.probationary.push_front(candidate, (), candidate_cost);
      } else {
        rejected.push(candidate);
      }
    }

    if rejected.is_empty() {
      Admission::Admit
    } else {
      Admission::AdmitAndEvict(rejected)
    }
  }

  /// Stops tracking `key`. Returns its cost if it was tracked.
  pub(crate) fn remove(&mut self, key: &str) -> Option<u64> {
    self
      .window
      .remove(key)
      .or_else(|| self.probationary.remove(key))
      .or_else(|| self.protected.remove(key))
      .map(|((), cost)| cost)
  }

  /// Picks victims until at least `cost_to_free` is released, probationary
  /// first, then protected, then the window.
  pub(crate) fn evict(&mut self, cost_to_free: u64) -> Vec<(String, u64)> {
    let mut victims = Vec::new();
    let mut freed = 0u64;

    for segment in [&mut self.probationary, &mut self.protected, &mut self.window] {
      while freed < cost_to_free {
        match segment.pop_back() {
          Some((key, (), cost)) => {
            freed += cost;
            victims.push((key, cost));
          }
          None => break,
        }
      }
    }

    victims
  }

  pub(crate) fn clear(&mut self) {
    self.window.clear();
    self.probationary.clear();
    self.protected.clear();
    self.sketch.clear();
  }

  fn main_victim(&self) -> Option<&String> {
    self.probationary.peek_back().or_else(|| self.protected.peek_back())
  }

  fn promote(&mut self, key: String, cost: u64) {
    self.protected.push_front(key, (), cost);
    self.maintain_protected();
  }

  /// Demotes protected overflow back to probationary.
  fn maintain_protected(&mut self) {
    while self.protected.total_cost() > self.protected_capacity {
      match self.protected.pop_back() {
        Some((key, (), cost)) => {
          self.probationary.push_front(key, (), cost);
        }
        None => break,
      }
    }
  }
}
