use crate::diag::{diag_debug, Diagnostics};
use crate::error::{Error, Result};
use crate::event::{Action, InvalidationEvent};
use crate::local::LocalCache;
use crate::metrics::{Stats, StatsSnapshot};
use crate::serializer::Serializer;
use crate::store::Store;
use crate::sync::Synchronizer;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Receives failures the cache handles internally (background decode errors,
/// best-effort publish failures, store errors on read).
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Turns a peer's `set` event into the value to cache locally. Returning
/// `None` skips the event.
pub type SetTransform<V> = Arc<dyn Fn(&InvalidationEvent) -> Option<V> + Send + Sync>;

/// Computes the local-cache cost of an entry.
pub type Weigher<V> = Arc<dyn Fn(&str, &V) -> u64 + Send + Sync>;

pub(crate) struct CacheCore<V> {
  pub(crate) instance_id: String,
  pub(crate) local: Box<dyn LocalCache<V>>,
  pub(crate) store: Box<dyn Store>,
  pub(crate) synchronizer: Box<dyn Synchronizer>,
  pub(crate) serializer: Arc<dyn Serializer<V>>,
  pub(crate) operation_timeout: Duration,
  pub(crate) write_through: bool,
  pub(crate) error_handler: Option<ErrorHandler>,
  pub(crate) transform: Option<SetTransform<V>>,
  pub(crate) weigher: Option<Weigher<V>>,
  pub(crate) diag: Diagnostics,
  pub(crate) stats: Stats,
  pub(crate) closed: AtomicBool,
}

/// A two-level cache kept in sync with its peers.
///
/// Reads are served from the local cache when possible and fall back to the
/// shared store. Writes land locally first, optionally in the store, and are
/// announced to peers over the synchronizer. Cloning is cheap; all clones
/// share one cache.
pub struct SyncedCache<V> {
  core: Arc<CacheCore<V>>,
}

impl<V> Clone for SyncedCache<V> {
  fn clone(&self) -> Self {
    Self {
      core: self.core.clone(),
    }
  }
}

impl<V> fmt::Debug for SyncedCache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SyncedCache")
      .field("instance_id", &self.core.instance_id)
      .field("write_through", &self.core.write_through)
      .field("closed", &self.core.closed.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

impl<V: Send + Sync + 'static> SyncedCache<V> {
  /// Wires the peer-event handler and starts listening.
  pub(crate) async fn start(core: CacheCore<V>) -> Result<Self> {
    let core = Arc::new(core);

    let weak: Weak<CacheCore<V>> = Arc::downgrade(&core);
    core.synchronizer.on_invalidate(Box::new(move |event: &InvalidationEvent| {
      if let Some(core) = weak.upgrade() {
        core.handle_invalidation(event);
      }
    }));
    let weak = Arc::downgrade(&core);
    core.synchronizer.on_error(Box::new(move |err: &Error| {
      if let Some(core) = weak.upgrade() {
        core.report(err);
      }
    }));

    let subscribed = core
      .diag
      .scope_async(core.bounded(core.synchronizer.subscribe()))
      .await;
    if let Err(err) = subscribed {
      core.diag.scope(|| tracing::error!(error = %err, "failed to subscribe to peer events"));
      core.closed.store(true, Ordering::Release);
      if let Err(teardown_err) = core.diag.scope_async(core.teardown()).await {
        core.diag.scope(|| {
          tracing::warn!(error = %teardown_err, "teardown after failed subscribe reported an error")
        });
        core.report(&teardown_err);
      }
      return Err(err);
    }

    core
      .diag
      .scope(|| diag_debug!(core.diag, instance_id = %core.instance_id, "synced cache started"));
    Ok(Self { core })
  }

  /// Looks `key` up locally, then in the backing store.
  ///
  /// A value found in the store is cached locally before it is returned.
  /// Store failures other than a missing key are passed to the error
  /// handler and reported as a miss.
  pub async fn get(&self, key: &str) -> Option<Arc<V>> {
    if self.core.is_closed() {
      return None;
    }
    self.core.diag.scope_async(self.core.get(key)).await
  }

  /// Caches `value` locally and pushes it to peers, which adopt it without
  /// touching the store.
  pub async fn set(&self, key: &str, value: V) -> Result<()> {
    self.core.ensure_open()?;
    self.core.diag.scope_async(self.core.set(key, value, false)).await
  }

  /// Caches `value` locally and tells peers to drop their copy, so their
  /// next read goes to the store.
  pub async fn set_with_invalidate(&self, key: &str, value: V) -> Result<()> {
    self.core.ensure_open()?;
    self.core.diag.scope_async(self.core.set(key, value, true)).await
  }

  pub async fn delete(&self, key: &str) -> Result<()> {
    self.core.ensure_open()?;
    self.core.diag.scope_async(self.core.delete(key)).await
  }

  /// Empties the local cache, the store, and every subscribed peer's local
  /// cache.
  pub async fn clear(&self) -> Result<()> {
    self.core.ensure_open()?;
    self.core.diag.scope_async(self.core.clear()).await
  }

  pub fn stats(&self) -> StatsSnapshot {
    self.core.stats.snapshot(self.core.local.metrics().size)
  }

  pub fn instance_id(&self) -> &str {
    &self.core.instance_id
  }

  pub fn is_closed(&self) -> bool {
    self.core.is_closed()
  }

  /// Applies a peer event. The synchronizer calls this for every event it
  /// receives; transports that deliver events some other way may call it
  /// directly.
  pub fn handle_invalidation(&self, event: &InvalidationEvent) {
    self.core.handle_invalidation(event);
  }

  /// Shuts down the synchronizer, then the store, then the local cache.
  ///
  /// Only the first call does anything. Returns the first teardown error.
  pub async fn close(&self) -> Result<()> {
    if self
      .core
      .closed
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Ok(());
    }
    self.core.diag.scope_async(self.core.teardown()).await
  }
}

impl<V: Send + Sync + 'static> CacheCore<V> {
  #[inline]
  fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  fn ensure_open(&self) -> Result<()> {
    if self.is_closed() {
      Err(Error::Closed)
    } else {
      Ok(())
    }
  }

  fn report(&self, err: &Error) {
    if let Some(handler) = &self.error_handler {
      handler(err);
    }
  }

  fn cost(&self, key: &str, value: &V) -> u64 {
    self.weigher.as_ref().map_or(1, |weigher| weigher(key, value))
  }

  async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(self.operation_timeout, operation).await {
      Ok(result) => result,
      Err(_) => Err(Error::Timeout(self.operation_timeout)),
    }
  }

  async fn get(&self, key: &str) -> Option<Arc<V>> {
    if let Some(value) = self.local.get(key) {
      Stats::incr(&self.stats.local_hits);
      diag_debug!(self.diag, key, "local hit");
      return Some(value);
    }
    Stats::incr(&self.stats.local_misses);

    let bytes = match self.bounded(self.store.get(key)).await {
      Ok(bytes) => bytes,
      Err(Error::NotFound) => {
        Stats::incr(&self.stats.remote_misses);
        diag_debug!(self.diag, key, "miss in both tiers");
        return None;
      }
      Err(err) => {
        Stats::incr(&self.stats.remote_misses);
        tracing::warn!(key, error = %err, "backing store read failed");
        self.report(&err);
        return None;
      }
    };
    Stats::incr(&self.stats.remote_hits);

    match self.serializer.deserialize(&bytes) {
      Ok(value) => {
        let value = Arc::new(value);
        self.local.set(key.to_string(), value.clone(), self.cost(key, &value));
        diag_debug!(self.diag, key, "remote hit, local cache repopulated");
        Some(value)
      }
      Err(err) => {
        tracing::error!(key, error = %err, "stored value could not be decoded");
        self.report(&err);
        None
      }
    }
  }

  async fn set(&self, key: &str, value: V, invalidate_only: bool) -> Result<()> {
    let value = Arc::new(value);
    self.local.set(key.to_string(), value.clone(), self.cost(key, &value));

    let bytes = self.serializer.serialize(&value).inspect_err(|err| {
      tracing::error!(key, error = %err, "value could not be encoded");
      self.report(err);
    })?;

    if self.write_through {
      self.bounded(self.store.set(key, &bytes)).await.inspect_err(|err| {
        tracing::error!(key, error = %err, "backing store write failed");
        self.report(err);
      })?;
    } else {
      diag_debug!(self.diag, key, "write-through disabled, store not written");
    }

    let event = if invalidate_only {
      InvalidationEvent::invalidate(key, self.instance_id.as_str())
    } else {
      InvalidationEvent::set(key, self.instance_id.as_str(), bytes)
    };
    self.publish_best_effort(&event).await;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.local.delete(key);

    self.bounded(self.store.delete(key)).await.inspect_err(|err| {
      tracing::error!(key, error = %err, "backing store delete failed");
      self.report(err);
    })?;

    self
      .publish_best_effort(&InvalidationEvent::delete(key, self.instance_id.as_str()))
      .await;
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    self.local.clear();

    self.bounded(self.store.clear()).await.inspect_err(|err| {
      tracing::error!(error = %err, "backing store clear failed");
      self.report(err);
    })?;

    self
      .publish_best_effort(&InvalidationEvent::clear(self.instance_id.as_str()))
      .await;
    Ok(())
  }

  /// Peers may go stale if this fails; the caller's write already succeeded.
  async fn publish_best_effort(&self, event: &InvalidationEvent) {
    match self.bounded(self.synchronizer.publish(event)).await {
      Ok(()) => {
        diag_debug!(self.diag, key = %event.key, action = %event.action, "published peer event");
      }
      Err(err) => {
        tracing::warn!(key = %event.key, action = %event.action, error = %err, "failed to publish peer event");
        self.report(&err);
      }
    }
  }

  async fn teardown(&self) -> Result<()> {
    let mut first_error = None;

    if let Err(err) = self.synchronizer.close().await {
      tracing::warn!(error = %err, "synchronizer close failed");
      first_error.get_or_insert(err);
    }
    if let Err(err) = self.store.close().await {
      tracing::warn!(error = %err, "store close failed");
      first_error.get_or_insert(err);
    }
    self.local.close();

    diag_debug!(self.diag, instance_id = %self.instance_id, "synced cache closed");
    first_error.map_or(Ok(()), Err)
  }

  fn handle_invalidation(&self, event: &InvalidationEvent) {
    if self.is_closed() {
      return;
    }
    self.diag.scope(|| self.apply(event));
  }

  fn apply(&self, event: &InvalidationEvent) {
    diag_debug!(
      self.diag,
      key = %event.key,
      sender = %event.sender,
      action = %event.action,
      "received peer event"
    );

    match &event.action {
      Action::Set => {
        if event.payload().is_empty() {
          return;
        }
        let value = match &self.transform {
          Some(transform) => match transform(event) {
            Some(value) => value,
            None => {
              diag_debug!(self.diag, key = %event.key, "transform skipped peer value");
              return;
            }
          },
          None => match self.serializer.deserialize(event.payload()) {
            Ok(value) => value,
            Err(err) => {
              tracing::error!(key = %event.key, sender = %event.sender, error = %err, "peer value could not be decoded");
              self.report(&err);
              return;
            }
          },
        };
        let cost = self.cost(&event.key, &value);
        self.local.set(event.key.clone(), Arc::new(value), cost);
      }
      Action::Invalidate | Action::Delete => {
        self.local.delete(&event.key);
        Stats::incr(&self.stats.invalidations);
      }
      Action::Clear => {
        self.local.clear();
        Stats::incr(&self.stats.invalidations);
      }
      Action::Unknown(action) => {
        diag_debug!(self.diag, key = %event.key, action = %action, "ignoring unknown peer action");
      }
    }
  }
}
