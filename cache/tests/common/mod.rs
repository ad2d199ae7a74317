#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fibre_synced_cache::sync::{ErrorCallback, InvalidationCallback};
use fibre_synced_cache::{
  CacheBuilder, Error, InvalidationEvent, MemoryBus, MemoryStore, MemorySynchronizer, Result, Store,
  SyncedCache, Synchronizer,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const CHANNEL: &str = "cache:invalidate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: u64,
  pub name: String,
}

pub fn alice() -> User {
  User {
    id: 1,
    name: "Alice".to_string(),
  }
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
  let deadline = Instant::now() + Duration::from_secs(2);
  while !condition() {
    if Instant::now() > deadline {
      panic!("timed out waiting for {what}");
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
}

/// Builds a pod on `bus` with the default local cache.
pub async fn pod<V>(id: &str, store: impl Store + 'static, bus: &MemoryBus, write_through: bool) -> SyncedCache<V>
where
  V: Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
  let synchronizer = bus.synchronizer(CHANNEL, id);
  CacheBuilder::new(id)
    .write_through(write_through)
    .build(store, synchronizer)
    .await
    .unwrap()
}

/// Counts the events a plain subscriber on the channel receives.
pub struct Probe {
  pub sync: MemorySynchronizer,
  pub events: Arc<Mutex<Vec<InvalidationEvent>>>,
}

impl Probe {
  pub async fn attach(bus: &MemoryBus, id: &str) -> Self {
    let sync = bus.synchronizer(CHANNEL, id);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    sync.on_invalidate(Box::new(move |event: &InvalidationEvent| sink.lock().push(event.clone())));
    sync.subscribe().await.unwrap();
    Self { sync, events }
  }

  pub fn count(&self) -> usize {
    self.events.lock().len()
  }
}

/// Call counters shared between a store double and the test.
#[derive(Debug, Default)]
pub struct StoreCalls {
  pub gets: AtomicUsize,
  pub sets: AtomicUsize,
  pub deletes: AtomicUsize,
  pub clears: AtomicUsize,
  pub closes: AtomicUsize,
}

impl StoreCalls {
  pub fn gets(&self) -> usize {
    self.gets.load(Ordering::SeqCst)
  }

  pub fn sets(&self) -> usize {
    self.sets.load(Ordering::SeqCst)
  }

  pub fn closes(&self) -> usize {
    self.closes.load(Ordering::SeqCst)
  }
}

/// A [`MemoryStore`] that counts calls and can refuse to be written.
#[derive(Debug, Clone)]
pub struct RecordingStore {
  inner: MemoryStore,
  pub calls: Arc<StoreCalls>,
  panic_on_set: bool,
}

impl RecordingStore {
  pub fn new(inner: MemoryStore) -> Self {
    Self {
      inner,
      calls: Arc::new(StoreCalls::default()),
      panic_on_set: false,
    }
  }

  /// A store that fails the test if anything writes a key to it.
  pub fn read_only(inner: MemoryStore) -> Self {
    Self {
      panic_on_set: true,
      ..Self::new(inner)
    }
  }
}

#[async_trait]
impl Store for RecordingStore {
  async fn get(&self, key: &str) -> Result<Vec<u8>> {
    self.calls.gets.fetch_add(1, Ordering::SeqCst);
    self.inner.get(key).await
  }

  async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
    assert!(!self.panic_on_set, "store must not be written, got set({key})");
    self.calls.sets.fetch_add(1, Ordering::SeqCst);
    self.inner.set(key, value).await
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.calls.deletes.fetch_add(1, Ordering::SeqCst);
    self.inner.delete(key).await
  }

  async fn clear(&self) -> Result<()> {
    self.calls.clears.fetch_add(1, Ordering::SeqCst);
    self.inner.clear().await
  }

  async fn close(&self) -> Result<()> {
    self.calls.closes.fetch_add(1, Ordering::SeqCst);
    self.inner.close().await
  }
}

/// A store whose every operation fails, optionally after a delay. `close`
/// succeeds unless `fail_close` is set.
#[derive(Debug, Clone, Default)]
pub struct BrokenStore {
  pub delay: Option<Duration>,
  pub fail_close: bool,
}

impl BrokenStore {
  async fn fail<T>(&self) -> Result<T> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    Err(Error::store("connection refused"))
  }
}

#[async_trait]
impl Store for BrokenStore {
  async fn get(&self, _key: &str) -> Result<Vec<u8>> {
    self.fail().await
  }

  async fn set(&self, _key: &str, _value: &[u8]) -> Result<()> {
    self.fail().await
  }

  async fn delete(&self, _key: &str) -> Result<()> {
    self.fail().await
  }

  async fn clear(&self) -> Result<()> {
    self.fail().await
  }

  async fn close(&self) -> Result<()> {
    if self.fail_close {
      return Err(Error::store("close refused"));
    }
    Ok(())
  }
}

/// Wraps a [`MemorySynchronizer`], counting closes and optionally failing
/// publish or subscribe.
pub struct FlakySynchronizer {
  inner: MemorySynchronizer,
  pub fail_publish: bool,
  pub fail_subscribe: bool,
  pub closes: Arc<AtomicUsize>,
}

impl FlakySynchronizer {
  pub fn new(inner: MemorySynchronizer) -> Self {
    Self {
      inner,
      fail_publish: false,
      fail_subscribe: false,
      closes: Arc::new(AtomicUsize::new(0)),
    }
  }
}

#[async_trait]
impl Synchronizer for FlakySynchronizer {
  fn instance_id(&self) -> &str {
    self.inner.instance_id()
  }

  fn channel(&self) -> &str {
    self.inner.channel()
  }

  async fn subscribe(&self) -> Result<()> {
    if self.fail_subscribe {
      return Err(Error::pubsub("subscribe refused"));
    }
    self.inner.subscribe().await
  }

  async fn publish(&self, event: &InvalidationEvent) -> Result<()> {
    if self.fail_publish {
      return Err(Error::pubsub("publish refused"));
    }
    self.inner.publish(event).await
  }

  fn on_invalidate(&self, callback: InvalidationCallback) {
    self.inner.on_invalidate(callback);
  }

  fn on_error(&self, callback: ErrorCallback) {
    self.inner.on_error(callback);
  }

  async fn close(&self) -> Result<()> {
    self.closes.fetch_add(1, Ordering::SeqCst);
    self.inner.close().await
  }
}

/// Collects everything passed to an error handler.
#[derive(Clone, Default)]
pub struct ErrorLog {
  pub errors: Arc<Mutex<Vec<String>>>,
}

impl ErrorLog {
  pub fn handler(&self) -> impl Fn(&Error) + Send + Sync + 'static {
    let errors = self.errors.clone();
    move |err: &Error| errors.lock().push(err.to_string())
  }

  pub fn len(&self) -> usize {
    self.errors.lock().len()
  }

  pub fn contains(&self, needle: &str) -> bool {
    self.errors.lock().iter().any(|e| e.contains(needle))
  }
}
