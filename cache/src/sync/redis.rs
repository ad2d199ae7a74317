use super::{ErrorCallback, InvalidationCallback, ListenerSlot, ListenerTask, Listeners, Synchronizer};
use crate::error::{Error, Result};
use crate::event::InvalidationEvent;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::oneshot;
use tracing::instrument::WithSubscriber;

/// A [`Synchronizer`] over Redis PUBLISH/SUBSCRIBE.
///
/// Publishing goes through a multiplexed connection; receiving uses a
/// dedicated pub/sub connection opened by [`Synchronizer::subscribe`].
pub struct RedisSynchronizer {
  client: Client,
  conn: MultiplexedConnection,
  channel: String,
  listeners: Arc<Listeners>,
  listener: ListenerSlot,
  closed: AtomicBool,
}

impl std::fmt::Debug for RedisSynchronizer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RedisSynchronizer")
      .field("channel", &self.channel)
      .field("instance_id", &self.listeners.instance_id())
      .field("closed", &self.closed.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

impl RedisSynchronizer {
  pub async fn connect(client: Client, channel: impl Into<String>, instance_id: impl Into<String>) -> Result<Self> {
    let conn = client
      .get_multiplexed_async_connection()
      .await
      .map_err(Error::pubsub)?;

    Ok(Self {
      client,
      conn,
      channel: channel.into(),
      listeners: Arc::new(Listeners::new(instance_id)),
      listener: ListenerSlot::default(),
      closed: AtomicBool::new(false),
    })
  }
}

#[async_trait]
impl Synchronizer for RedisSynchronizer {
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
        let mut pubsub = self.client.get_async_pubsub().await.map_err(Error::pubsub)?;
        pubsub.subscribe(&self.channel).await.map_err(Error::pubsub)?;

        let listeners = self.listeners.clone();
        let channel = self.channel.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(
          async move {
            // Dropping the stream closes the subscription connection.
            let mut messages = pubsub.into_on_message();
            loop {
              tokio::select! {
                _ = &mut stop_rx => break,
                message = messages.next() => match message {
                  Some(message) => listeners.dispatch_bytes(message.get_payload_bytes()),
                  None => {
                    tracing::warn!(channel = %channel, "redis subscription stream ended");
                    listeners.report(&Error::pubsub(format!("subscription to {channel} ended")));
                    break;
                  }
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
    let payload = event.to_bytes()?;
    let mut conn = self.conn.clone();
    let _: i64 = conn
      .publish(&self.channel, payload)
      .await
      .map_err(Error::pubsub)?;
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
