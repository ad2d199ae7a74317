use crate::cache::{CacheCore, ErrorHandler, SetTransform, SyncedCache, Weigher};
use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::event::InvalidationEvent;
use crate::local::{FrequencyCacheFactory, LocalCacheConfig, LocalCacheFactory};
use crate::metrics::Stats;
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::{MemoryStore, Store, StoreConfig};
use crate::sync::{MemoryBus, Synchronizer, DEFAULT_CHANNEL};

use core::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::Dispatch;

/// Default bound on every store and pub/sub call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// A builder for [`SyncedCache`] instances.
///
/// ```no_run
/// # async fn demo() -> fibre_synced_cache::Result<()> {
/// use fibre_synced_cache::{CacheBuilder, MemoryBus, MemoryStore};
///
/// let bus = MemoryBus::new();
/// let store = MemoryStore::new();
/// let cache = CacheBuilder::<String>::new("pod-a")
///   .write_through(true)
///   .build_in_process(store, &bus)
///   .await?;
/// cache.set("greeting", "hello".to_string()).await?;
/// # Ok(())
/// # }
/// ```
pub struct CacheBuilder<V> {
  instance_id: String,
  channel: String,
  store_config: StoreConfig,
  local_config: LocalCacheConfig,
  local_factory: Option<Box<dyn LocalCacheFactory<V>>>,
  serializer: Arc<dyn Serializer<V>>,
  operation_timeout: Duration,
  write_through: bool,
  error_handler: Option<ErrorHandler>,
  transform: Option<SetTransform<V>>,
  weigher: Option<Weigher<V>>,
  debug_mode: bool,
  dispatch: Option<Dispatch>,
}

impl<V> fmt::Debug for CacheBuilder<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("instance_id", &self.instance_id)
      .field("channel", &self.channel)
      .field("store_config", &self.store_config)
      .field("local_config", &self.local_config)
      .field("has_local_factory", &self.local_factory.is_some())
      .field("operation_timeout", &self.operation_timeout)
      .field("write_through", &self.write_through)
      .field("has_transform", &self.transform.is_some())
      .field("debug_mode", &self.debug_mode)
      .finish_non_exhaustive()
  }
}

impl<V> CacheBuilder<V>
where
  V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
  /// Starts a builder for the instance `instance_id`, encoding values as
  /// JSON.
  ///
  /// `instance_id` must be unique among live instances sharing a channel.
  /// Two instances with the same id silently ignore each other's events.
  pub fn new(instance_id: impl Into<String>) -> Self {
    Self::with_serializer(instance_id, JsonSerializer::new())
  }
}

impl<V: Send + Sync + 'static> CacheBuilder<V> {
  /// Starts a builder that encodes values with `serializer`.
  pub fn with_serializer<S>(instance_id: impl Into<String>, serializer: S) -> Self
  where
    S: Serializer<V> + 'static,
  {
    Self {
      instance_id: instance_id.into(),
      channel: DEFAULT_CHANNEL.to_string(),
      store_config: StoreConfig::default(),
      local_config: LocalCacheConfig::default(),
      local_factory: None,
      serializer: Arc::new(serializer),
      operation_timeout: DEFAULT_OPERATION_TIMEOUT,
      write_through: false,
      error_handler: None,
      transform: None,
      weigher: None,
      debug_mode: false,
      dispatch: None,
    }
  }

  /// Sets the notification channel name.
  pub fn channel(mut self, channel: impl Into<String>) -> Self {
    self.channel = channel.into();
    self
  }

  /// Sets how to reach a networked backing store.
  pub fn store_config(mut self, config: StoreConfig) -> Self {
    self.store_config = config;
    self
  }

  /// Sizes the default (frequency-based) local cache.
  pub fn local_cache_config(mut self, config: LocalCacheConfig) -> Self {
    self.local_config = config;
    self
  }

  /// Replaces the default local cache.
  pub fn local_cache<F>(mut self, factory: F) -> Self
  where
    F: LocalCacheFactory<V> + 'static,
  {
    self.local_factory = Some(Box::new(factory));
    self
  }

  pub fn serializer<S>(mut self, serializer: S) -> Self
  where
    S: Serializer<V> + 'static,
  {
    self.serializer = Arc::new(serializer);
    self
  }

  /// Bounds every store and publish call. Defaults to five seconds.
  pub fn operation_timeout(mut self, timeout: Duration) -> Self {
    self.operation_timeout = timeout;
    self
  }

  /// Lets `set` write the backing store. Off by default: a reader instance
  /// only updates its own local cache and notifies peers, so it can never
  /// overwrite the store with a stale value.
  pub fn write_through(mut self, enabled: bool) -> Self {
    self.write_through = enabled;
    self
  }

  /// Receives failures the cache absorbs instead of returning.
  pub fn on_error<F>(mut self, handler: F) -> Self
  where
    F: Fn(&Error) + Send + Sync + 'static,
  {
    self.error_handler = Some(Arc::new(handler));
    self
  }

  /// Decides what a peer's `set` event stores locally. Returning `None`
  /// skips the event, e.g. because the local copy is newer.
  pub fn on_peer_set<F>(mut self, transform: F) -> Self
  where
    F: Fn(&InvalidationEvent) -> Option<V> + Send + Sync + 'static,
  {
    self.transform = Some(Arc::new(transform));
    self
  }

  /// Computes the local-cache cost of each entry. Every entry costs 1 by
  /// default.
  pub fn weigher<F>(mut self, weigher: F) -> Self
  where
    F: Fn(&str, &V) -> u64 + Send + Sync + 'static,
  {
    self.weigher = Some(Arc::new(weigher));
    self
  }

  /// Emits a debug event for every operation and peer event.
  pub fn debug_mode(mut self, enabled: bool) -> Self {
    self.debug_mode = enabled;
    self
  }

  /// Routes this instance's log events to `dispatch` instead of the ambient
  /// subscriber.
  pub fn dispatch(mut self, dispatch: impl Into<Dispatch>) -> Self {
    self.dispatch = Some(dispatch.into());
    self
  }

  fn validate(&self) -> Result<()> {
    if self.instance_id.trim().is_empty() {
      return Err(Error::InvalidConfig("instance id is required".into()));
    }
    if self.channel.trim().is_empty() {
      return Err(Error::InvalidConfig("channel name is required".into()));
    }
    if self.operation_timeout.is_zero() {
      return Err(Error::InvalidConfig("operation timeout must be greater than zero".into()));
    }
    if self.local_factory.is_none() {
      if self.local_config.num_counters == 0 {
        return Err(Error::InvalidConfig("num_counters must be greater than zero".into()));
      }
      if self.local_config.max_cost == 0 {
        return Err(Error::InvalidConfig("max_cost must be greater than zero".into()));
      }
    }
    Ok(())
  }

  /// Builds a cache on the given store and synchronizer and starts listening
  /// for peer events.
  pub async fn build<S, Y>(self, store: S, synchronizer: Y) -> Result<SyncedCache<V>>
  where
    S: Store + 'static,
    Y: Synchronizer + 'static,
  {
    self.validate()?;
    if synchronizer.instance_id() != self.instance_id {
      return Err(Error::InvalidConfig(format!(
        "synchronizer identity {:?} does not match instance id {:?}",
        synchronizer.instance_id(),
        self.instance_id
      )));
    }
    if synchronizer.channel() != self.channel {
      return Err(Error::InvalidConfig(format!(
        "synchronizer channel {:?} does not match configured channel {:?}",
        synchronizer.channel(),
        self.channel
      )));
    }

    let local = match &self.local_factory {
      Some(factory) => factory.create()?,
      None => LocalCacheFactory::<V>::create(&FrequencyCacheFactory::new(self.local_config.clone()))?,
    };

    let core = CacheCore {
      instance_id: self.instance_id,
      local,
      store: Box::new(store),
      synchronizer: Box::new(synchronizer),
      serializer: self.serializer,
      operation_timeout: self.operation_timeout,
      write_through: self.write_through,
      error_handler: self.error_handler,
      transform: self.transform,
      weigher: self.weigher,
      diag: Diagnostics::new(self.dispatch, self.debug_mode),
      stats: Stats::default(),
      closed: AtomicBool::new(false),
    };

    SyncedCache::start(core).await
  }

  /// Builds a cache whose peers live in the same process: `store` is shared
  /// through its clones, events travel over `bus` on the configured channel.
  pub async fn build_in_process(self, store: MemoryStore, bus: &MemoryBus) -> Result<SyncedCache<V>> {
    let synchronizer = bus.synchronizer(self.channel.clone(), self.instance_id.clone());
    self.build(store, synchronizer).await
  }

  /// Connects to Redis (store and pub/sub) using the configured
  /// [`StoreConfig`] and channel.
  #[cfg(feature = "redis")]
  pub async fn connect_redis(self) -> Result<SyncedCache<V>> {
    use crate::store::RedisStore;
    use crate::sync::RedisSynchronizer;

    self.validate()?;
    if self.store_config.address.trim().is_empty() {
      return Err(Error::InvalidConfig("store address is required".into()));
    }

    let store = RedisStore::connect(&self.store_config).await?;
    let synchronizer =
      RedisSynchronizer::connect(store.client().clone(), self.channel.clone(), self.instance_id.clone()).await?;
    self.build(store, synchronizer).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn rejects_empty_identity() {
    let bus = MemoryBus::new();
    let result = CacheBuilder::<String>::new("  ")
      .build_in_process(MemoryStore::new(), &bus)
      .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
  }

  #[tokio::test]
  async fn rejects_empty_channel_and_zero_timeout() {
    let bus = MemoryBus::new();
    let result = CacheBuilder::<String>::new("a")
      .channel("")
      .build_in_process(MemoryStore::new(), &bus)
      .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));

    let result = CacheBuilder::<String>::new("a")
      .operation_timeout(Duration::ZERO)
      .build_in_process(MemoryStore::new(), &bus)
      .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
  }

  #[tokio::test]
  async fn rejects_synchronizer_with_other_identity() {
    let bus = MemoryBus::new();
    let result = CacheBuilder::<String>::new("a")
      .build(MemoryStore::new(), bus.synchronizer(DEFAULT_CHANNEL, "not-a"))
      .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
  }

  #[tokio::test]
  async fn rejects_synchronizer_on_other_channel() {
    let bus = MemoryBus::new();
    let result = CacheBuilder::<String>::new("a")
      .channel("orders")
      .build(MemoryStore::new(), bus.synchronizer(DEFAULT_CHANNEL, "a"))
      .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));

    let cache = CacheBuilder::<String>::new("a")
      .channel("orders")
      .build(MemoryStore::new(), bus.synchronizer("orders", "a"))
      .await
      .unwrap();
    cache.close().await.unwrap();
  }

  #[tokio::test]
  async fn rejects_zero_sizing_for_default_local_cache() {
    let bus = MemoryBus::new();
    let result = CacheBuilder::<String>::new("a")
      .local_cache_config(LocalCacheConfig {
        max_cost: 0,
        ..LocalCacheConfig::default()
      })
      .build_in_process(MemoryStore::new(), &bus)
      .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
  }

  #[tokio::test]
  async fn defaults() {
    let builder = CacheBuilder::<String>::new("a");
    assert_eq!(builder.channel, DEFAULT_CHANNEL);
    assert_eq!(builder.operation_timeout, DEFAULT_OPERATION_TIMEOUT);
    assert!(!builder.write_through);
    assert!(!builder.debug_mode);
    assert_eq!(builder.store_config.address, crate::store::DEFAULT_STORE_ADDRESS);

    let bus = MemoryBus::new();
    let cache = builder.build_in_process(MemoryStore::new(), &bus).await.unwrap();
    assert_eq!(cache.instance_id(), "a");
    cache.close().await.unwrap();
  }
}
