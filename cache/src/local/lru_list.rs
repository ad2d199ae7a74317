use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Node<K, T> {
  key: K,
  value: T,
  cost: u64,
  next: Option<Index>,
  prev: Option<Index>,
}

/// A cost-tracking, recency-ordered list with O(1) lookup, promotion and
/// removal.
///
/// Nodes live in a generational arena and are linked by index; `lookup` maps
/// each key to its node. The head is the most recently used entry. `T` is the
/// payload carried alongside the key: the cached value for `RecencyCache`,
/// `()` for the TinyLFU segments, which only track keys.
#[derive(Debug)]
pub(crate) struct LruList<K: Eq + Hash + Clone, T = ()> {
  nodes: Arena<Node<K, T>>,
  lookup: HashMap<K, Index, ahash::RandomState>,
  head: Option<Index>,
  tail: Option<Index>,
  total_cost: u64,
}

impl<K: Eq + Hash + Clone, T> LruList<K, T> {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      lookup: HashMap::with_hasher(ahash::RandomState::new()),
      head: None,
      tail: None,
      total_cost: 0,
    }
  }

  fn unlink(&mut self, index: Index) {
    let (prev, next) = {
      let node = &self.nodes[index];
      (node.prev, node.next)
    };

    match prev {
      Some(prev_idx) => self.nodes[prev_idx].next = next,
      None => self.head = next,
    }
    match next {
      Some(next_idx) => self.nodes[next_idx].prev = prev,
      None => self.tail = prev,
    }
  }

  fn link_front(&mut self, index: Index) {
    let old_head = self.head;
    self.nodes[index].next = old_head;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old_head_idx) = old_head {
      self.nodes[old_head_idx].prev = Some(index);
    }
    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.lookup.len()
  }

  pub(crate) fn contains<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.lookup.contains_key(key)
  }

  pub(crate) fn total_cost(&self) -> u64 {
    self.total_cost
  }

  /// Inserts `key` at the head, or replaces its payload and cost and moves it
  /// to the head if it is already present. Returns the previous payload.
  pub(crate) fn push_front(&mut self, key: K, value: T, cost: u64) -> Option<T> {
    if let Some(&index) = self.lookup.get(&key) {
      let node = &mut self.nodes[index];
      self.total_cost = self.total_cost.saturating_sub(node.cost) + cost;
      node.cost = cost;
      let previous = std::mem::replace(&mut node.value, value);
      if self.head != Some(index) {
        self.unlink(index);
        self.link_front(index);
      }
      return Some(previous);
    }

    let index = self.nodes.insert(Node {
      key: key.clone(),
      value,
      cost,
      next: None,
      prev: None,
    });
    self.lookup.insert(key, index);
    self.total_cost += cost;
    self.link_front(index);
    None
  }

  /// Marks `key` as most recently used and returns its payload.
  pub(crate) fn touch<Q>(&mut self, key: &Q) -> Option<&T>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index = *self.lookup.get(key)?;
    if self.head != Some(index) {
      self.unlink(index);
      self.link_front(index);
    }
    Some(&self.nodes[index].value)
  }

  /// The least recently used key, without modifying the order.
  pub(crate) fn peek_back(&self) -> Option<&K> {
    self.tail.map(|index| &self.nodes[index].key)
  }

  pub(crate) fn pop_back(&mut self) -> Option<(K, T, u64)> {
    let tail = self.tail?;
    self.unlink(tail);
    let node = self.nodes.remove(tail)?;
    self.lookup.remove(&node.key);
    self.total_cost = self.total_cost.saturating_sub(node.cost);
    Some((node.key, node.value, node.cost))
  }

  pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<(T, u64)>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index = self.lookup.remove(key)?;
    self.unlink(index);
    let node = self.nodes.remove(index)?;
    self.total_cost = self.total_cost.saturating_sub(node.cost);
    Some((node.value, node.cost))
  }

  pub(crate) fn clear(&mut self) {
    self.nodes.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
    self.total_cost = 0;
  }

  #[cfg(test)]
  pub(crate) fn keys_as_vec(&self) -> Vec<K> {
    let mut keys = Vec::with_capacity(self.len());
    let mut current = self.head;
    while let Some(index) = current {
      keys.push(self.nodes[index].key.clone());
      current = self.nodes[index].next;
    }
    keys
  }
}
