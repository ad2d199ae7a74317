use super::{ErrorCallback, InvalidationCallback, ListenerSlot, ListenerTask, Listeners, Synchronizer};
use crate::error::{Error, Result};
use crate::event::InvalidationEvent;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::instrument::WithSubscriber;

const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// An in-process pub/sub hub with named topics.
///
/// Every [`MemorySynchronizer`] created from the same bus (or a clone of it)
/// on the same channel sees the others' events. Payloads travel in their
/// encoded wire form.
#[derive(Debug, Clone)]
pub struct MemoryBus {
  topics: Arc<Mutex<HashMap<String, broadcast::Sender<Arc<[u8]>>>>>,
  capacity: usize,
}

impl Default for MemoryBus {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryBus {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
  }

  /// A bus whose topics buffer at most `capacity` undelivered events per
  /// subscriber. Slower subscribers skip ahead and log a warning.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      topics: Arc::new(Mutex::new(HashMap::new())),
      capacity: capacity.max(1),
    }
  }

  pub fn synchronizer(&self, channel: impl Into<String>, instance_id: impl Into<String>) -> MemorySynchronizer {
    let channel = channel.into();
    MemorySynchronizer {
      sender: self.topic(&channel),
      channel,
      listeners: Arc::new(Listeners::new(instance_id)),
      listener: ListenerSlot::default(),
      closed: AtomicBool::new(false),
    }
  }

  /// Sends an already encoded payload to every subscriber of `channel`.
  /// Returns how many subscribers it reached.
  pub fn publish_raw(&self, channel: &str, payload: &[u8]) -> usize {
    self.topic(channel).send(Arc::from(payload)).unwrap_or(0)
  }

  fn topic(&self, channel: &str) -> broadcast::Sender<Arc<[u8]>> {
    self
      .topics
      .lock()
      .entry(channel.to_string())
      .or_insert_with(|| broadcast::channel(self.capacity).0)
      .clone()
  }
}

/// A [`Synchronizer`] on a [`MemoryBus`] topic.
pub struct MemorySynchronizer {
  channel: String,
  sender: broadcast::Sender<Arc<[u8]>>,
  listeners: Arc<Listeners>,
  listener: ListenerSlot,
  closed: AtomicBool,
}

impl std::fmt::Debug for MemorySynchronizer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemorySynchronizer")
      .field("channel", &self.channel)
      .field("instance_id", &self.listeners.instance_id())
      .field("closed", &self.closed.load(Ordering::Relaxed))
      .finish()
  }
}

#[async_trait]
impl Synchronizer for MemorySynchronizer {
  fn instance_id(&self) -> &str {
    self.listeners.instance_id()
  }

  fn channel(&self) -> &str {
    &self.channel
  }

  async fn subscribe(&self) -> Result<()> {
    if self.closed.load(Ordering::Acquire) {
      return Err(Error::Closed);
    }

    self
      .listener
      .start(|| async {
        let mut receiver = self.sender.subscribe();
        let listeners = self.listeners.clone();
        let channel = self.channel.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(
          async move {
            loop {
              tokio::select! {
                _ = &mut stop_rx => break,
                received = receiver.recv() => match received {
                  Ok(payload) => listeners.dispatch_bytes(&payload),
                  Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %channel, skipped, "invalidation listener lagged, events were dropped");
                  }
                  Err(broadcast::error::RecvError::Closed) => break,
                },
              }
            }
          }
          .with_current_subscriber(),
        );

        Ok(ListenerTask::new(stop_tx, handle))
      })
      .await
  }

  async fn publish(&self, event: &InvalidationEvent) -> Result<()> {
    if self.closed.load(Ordering::Acquire) {
      return Err(Error::Closed);
    }
    let payload: Arc<[u8]> = event.to_bytes()?.into();
    // No subscribers is not a failure.
    let _ = self.sender.send(payload);
    Ok(())
  }

  fn on_invalidate(&self, callback: InvalidationCallback) {
    self.listeners.add_invalidate(callback);
  }

  fn on_error(&self, callback: ErrorCallback) {
    self.listeners.add_error(callback);
  }

  async fn close(&self) -> Result<()> {
    if self.closed.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    self.listener.shutdown().await;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::time::Duration;
  use tokio::sync::mpsc;

  #[tokio::test]
  async fn peers_receive_events_but_sender_does_not() {
    let bus = MemoryBus::new();
    let a = bus.synchronizer("ch", "a");
    let b = bus.synchronizer("ch", "b");

    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    a.on_invalidate(Box::new(move |event: &InvalidationEvent| {
      let _ = a_tx.send(event.clone());
    }));
    let (b_tx, mut b_rx) = mpsc::unbounded_channel();
    b.on_invalidate(Box::new(move |event: &InvalidationEvent| {
      let _ = b_tx.send(event.clone());
    }));
    a.subscribe().await.unwrap();
    b.subscribe().await.unwrap();

    let event = InvalidationEvent::set("k", "a", b"1".to_vec());
    a.publish(&event).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), b_rx.recv()).await.unwrap();
    assert_eq!(received, Some(event));
    assert!(tokio::time::timeout(Duration::from_millis(50), a_rx.recv()).await.is_err());

    a.close().await.unwrap();
    b.close().await.unwrap();
  }

  #[tokio::test]
  async fn channels_are_isolated() {
    let bus = MemoryBus::new();
    let a = bus.synchronizer("one", "a");
    let b = bus.synchronizer("two", "b");

    let (tx, mut rx) = mpsc::unbounded_channel::<InvalidationEvent>();
    b.on_invalidate(Box::new(move |event: &InvalidationEvent| {
      let _ = tx.send(event.clone());
    }));
    b.subscribe().await.unwrap();

    a.publish(&InvalidationEvent::delete("k", "a")).await.unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
  }

  #[tokio::test]
  async fn concurrent_subscribes_start_one_listener() {
    let bus = MemoryBus::new();
    let sync = bus.synchronizer("ch", "a");
    let (tx, mut rx) = mpsc::unbounded_channel::<InvalidationEvent>();
    sync.on_invalidate(Box::new(move |event: &InvalidationEvent| {
      let _ = tx.send(event.clone());
    }));

    let (first, second) = tokio::join!(sync.subscribe(), sync.subscribe());
    first.unwrap();
    second.unwrap();
    sync.subscribe().await.unwrap();

    assert_eq!(bus.publish_raw("ch", &InvalidationEvent::delete("k", "b").to_bytes().unwrap()), 1);
    assert!(tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_some());
    assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    sync.close().await.unwrap();
  }

  #[tokio::test]
  async fn exposes_identity_and_channel() {
    let bus = MemoryBus::new();
    let sync = bus.synchronizer("ch", "a");
    assert_eq!(sync.instance_id(), "a");
    assert_eq!(sync.channel(), "ch");
  }

  #[tokio::test]
  async fn close_is_idempotent_and_blocks_publish() {
    let bus = MemoryBus::new();
    let sync = bus.synchronizer("ch", "a");
    sync.subscribe().await.unwrap();

    sync.close().await.unwrap();
    sync.close().await.unwrap();
    assert!(matches!(
      sync.publish(&InvalidationEvent::clear("a")).await,
      Err(Error::Closed)
    ));
    assert!(matches!(sync.subscribe().await, Err(Error::Closed)));
  }
}
