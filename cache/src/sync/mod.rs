//! Peer synchronization over a publish/subscribe channel.
//!
//! A [`Synchronizer`] publishes this instance's [`InvalidationEvent`]s and
//! runs one background task that receives everybody else's. Received
//! payloads are decoded, events sent by this instance are dropped, and the
//! registered callbacks run synchronously, in registration order, on that
//! task.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::{MemoryBus, MemorySynchronizer};
#[cfg(feature = "redis")]
pub use self::redis::RedisSynchronizer;

use crate::error::{Error, Result};
use crate::event::InvalidationEvent;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// Default notification channel name.
pub const DEFAULT_CHANNEL: &str = "cache:invalidate";

/// Called for every event received from a peer.
pub type InvalidationCallback = Box<dyn Fn(&InvalidationEvent) + Send + Sync>;

/// Called for failures that happen on the background receive task.
pub type ErrorCallback = Box<dyn Fn(&Error) + Send + Sync>;

#[async_trait]
pub trait Synchronizer: Send + Sync {
  /// The identity stamped on outgoing events and used to skip incoming ones.
  fn instance_id(&self) -> &str;

  fn channel(&self) -> &str;

  /// Starts receiving peer events. Callbacks should be registered first.
  async fn subscribe(&self) -> Result<()>;

  async fn publish(&self, event: &InvalidationEvent) -> Result<()>;

  /// Registers a callback. Every registered callback sees every peer event.
  fn on_invalidate(&self, callback: InvalidationCallback);

  fn on_error(&self, callback: ErrorCallback);

  /// Stops the receive task and releases the subscription. Calling it again
  /// is a no-op.
  async fn close(&self) -> Result<()>;
}

/// The callback registry shared between a synchronizer and its receive task.
pub struct Listeners {
  instance_id: String,
  invalidate: RwLock<Vec<Arc<dyn Fn(&InvalidationEvent) + Send + Sync>>>,
  errors: RwLock<Vec<Arc<dyn Fn(&Error) + Send + Sync>>>,
}

impl fmt::Debug for Listeners {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Listeners")
      .field("instance_id", &self.instance_id)
      .field("invalidate", &self.invalidate.read().len())
      .field("errors", &self.errors.read().len())
      .finish()
  }
}

impl Listeners {
  pub fn new(instance_id: impl Into<String>) -> Self {
    Self {
      instance_id: instance_id.into(),
      invalidate: RwLock::new(Vec::new()),
      errors: RwLock::new(Vec::new()),
    }
  }

  pub fn instance_id(&self) -> &str {
    &self.instance_id
  }

  pub fn add_invalidate(&self, callback: InvalidationCallback) {
    self.invalidate.write().push(Arc::from(callback));
  }

  pub fn add_error(&self, callback: ErrorCallback) {
    self.errors.write().push(Arc::from(callback));
  }

  /// Decodes a raw channel payload and dispatches it. Undecodable payloads
  /// go to the error callbacks.
  pub fn dispatch_bytes(&self, payload: &[u8]) {
    match InvalidationEvent::from_bytes(payload) {
      Ok(event) => self.dispatch(&event),
      Err(err) => {
        tracing::warn!(error = %err, "dropping undecodable invalidation event");
        self.report(&err);
      }
    }
  }

  /// Runs every invalidation callback for `event`, unless this instance sent
  /// it.
  pub fn dispatch(&self, event: &InvalidationEvent) {
    if event.sender == self.instance_id {
      return;
    }
    // Snapshot so a callback may register further callbacks.
    let callbacks = self.invalidate.read().clone();
    for callback in callbacks {
      callback(event);
    }
  }

  pub fn report(&self, err: &Error) {
    let callbacks = self.errors.read().clone();
    for callback in callbacks {
      callback(err);
    }
  }
}

/// Handle on a running receive task.
pub(crate) struct ListenerTask {
  stop: oneshot::Sender<()>,
  handle: JoinHandle<()>,
}

impl ListenerTask {
  pub(crate) fn new(stop: oneshot::Sender<()>, handle: JoinHandle<()>) -> Self {
    Self { stop, handle }
  }

  /// Signals the task and waits for it to finish.
  pub(crate) async fn stop(self) {
    // The task may already have ended on its own.
    let _ = self.stop.send(());
    if let Err(err) = self.handle.await {
      if err.is_panic() {
        tracing::error!("invalidation listener panicked");
      }
    }
  }
}

/// The at-most-once slot for a synchronizer's receive task.
#[derive(Default)]
pub(crate) struct ListenerSlot {
  task: Mutex<Option<ListenerTask>>,
}

impl ListenerSlot {
  /// Runs `spawn` and keeps the task it returns, unless a task is already
  /// running. The slot stays locked until `spawn` completes, so concurrent
  /// callers never start a second task.
  pub(crate) async fn start<F, Fut>(&self, spawn: F) -> Result<()>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<ListenerTask>>,
  {
    let mut slot = self.task.lock().await;
    if slot.is_none() {
      *slot = Some(spawn().await?);
    }
    Ok(())
  }

  pub(crate) async fn shutdown(&self) {
    let task = self.task.lock().await.take();
    if let Some(task) = task {
      task.stop().await;
    }
  }
}
