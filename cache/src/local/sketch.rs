use std::hash::Hash;

const DEPTH: usize = 4;

/// A count-min sketch estimating access frequency with saturating 8-bit
/// counters.
///
/// `num_counters` is the total counter count across all rows. After `sample_size`
/// increments every counter is halved so old popularity fades out.
#[derive(Debug)]
pub(crate) struct CountMinSketch {
  rows: [Box<[u8]>; DEPTH],
  mask: usize,
  hashers: [ahash::RandomState; DEPTH],
  increments: usize,
  sample_size: usize,
}

impl CountMinSketch {
  pub(crate) fn new(num_counters: usize, sample_size: usize) -> Self {
    let width = (num_counters / DEPTH).max(64).next_power_of_two();
    Self {
      rows: std::array::from_fn(|_| vec![0u8; width].into_boxed_slice()),
      mask: width - 1,
      hashers: std::array::from_fn(|_| ahash::RandomState::new()),
      increments: 0,
      sample_size: sample_size.max(1),
    }
  }

  #[inline]
  fn slot<K: Hash + ?Sized>(&self, row: usize, key: &K) -> usize {
    self.hashers[row].hash_one(key) as usize & self.mask
  }

  pub(crate) fn increment<K: Hash + ?Sized>(&mut self, key: &K) {
    for row in 0..DEPTH {
      let slot = self.slot(row, key);
      let counter = &mut self.rows[row][slot];
      *counter = counter.saturating_add(1);
    }
    self.increments += 1;
    if self.increments >= self.sample_size {
      self.age();
    }
  }

  pub(crate) fn estimate<K: Hash + ?Sized>(&self, key: &K) -> u8 {
    (0..DEPTH)
      .map(|row| self.rows[row][self.slot(row, key)])
      .min()
      .unwrap_or(0)
  }

  fn age(&mut self) {
    self.increments = 0;
    for row in &mut self.rows {
      for counter in row.iter_mut() {
        *counter >>= 1;
      }
    }
  }

  pub(crate) fn clear(&mut self) {
    self.increments = 0;
    for row in &mut self.rows {
      row.fill(0);
    }
  }
}
