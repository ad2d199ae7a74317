use super::{Store, StoreConfig};
use crate::error::{Error, Result};

use std::sync::atomic::{AtomicBool, Ordering};

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use url::Url;

/// A [`Store`] backed by a Redis server over a multiplexed async connection.
#[derive(Clone)]
pub struct RedisStore {
  client: Client,
  conn: MultiplexedConnection,
  closed: std::sync::Arc<AtomicBool>,
}

impl std::fmt::Debug for RedisStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RedisStore")
      .field("closed", &self.closed.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

impl RedisStore {
  /// Opens a connection and verifies it with a PING.
  pub async fn connect(config: &StoreConfig) -> Result<Self> {
    let client = Client::open(connection_url(config)?).map_err(Error::store)?;
    let mut conn = client
      .get_multiplexed_async_connection()
      .await
      .map_err(Error::store)?;

    let _: String = ::redis::cmd("PING")
      .query_async(&mut conn)
      .await
      .map_err(Error::store)?;

    Ok(Self {
      client,
      conn,
      closed: std::sync::Arc::new(AtomicBool::new(false)),
    })
  }

  /// The underlying client, for opening further connections (e.g. pub/sub)
  /// to the same server.
  pub fn client(&self) -> &Client {
    &self.client
  }

  fn connection(&self) -> Result<MultiplexedConnection> {
    if self.closed.load(Ordering::Acquire) {
      return Err(Error::Closed);
    }
    Ok(self.conn.clone())
  }
}

#[async_trait]
impl Store for RedisStore {
  async fn get(&self, key: &str) -> Result<Vec<u8>> {
    let mut conn = self.connection()?;
    let value: Option<Vec<u8>> = conn.get(key).await.map_err(Error::store)?;
    value.ok_or(Error::NotFound)
  }

  async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
    let mut conn = self.connection()?;
    let _: () = conn.set(key, value).await.map_err(Error::store)?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let mut conn = self.connection()?;
    let _: i64 = conn.del(key).await.map_err(Error::store)?;
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    let mut conn = self.connection()?;
    let _: () = ::redis::cmd("FLUSHDB")
      .query_async(&mut conn)
      .await
      .map_err(Error::store)?;
    Ok(())
  }

  async fn close(&self) -> Result<()> {
    self.closed.store(true, Ordering::Release);
    Ok(())
  }
}

/// Folds the password and database of `config` into its address, unless the
/// address already carries them. The password is percent-encoded.
pub(crate) fn connection_url(config: &StoreConfig) -> Result<String> {
  let mut url = Url::parse(&config.address)
    .map_err(|err| Error::InvalidConfig(format!("invalid store address {:?}: {err}", config.address)))?;

  if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
    if url.password().is_none() {
      // `Url` leaves `%` alone, and the driver percent-decodes the password.
      let escaped = password.replace('%', "%25");
      url
        .set_password(Some(&escaped))
        .map_err(|()| Error::InvalidConfig("store address cannot carry a password".into()))?;
    }
  }

  if config.database != 0 && matches!(url.path(), "" | "/") {
    url.set_path(&format!("/{}", config.database));
  }

  Ok(url.into())
}
