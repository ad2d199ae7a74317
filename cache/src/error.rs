use std::time::Duration;

use thiserror::Error;

/// A boxed, thread-safe error coming from a collaborator (serializer, store
/// driver, pub/sub transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type shared by every component of the crate.
#[derive(Debug, Error)]
pub enum Error {
  /// The cache (or one of its components) has already been closed.
  #[error("cache is closed")]
  Closed,

  /// The configuration was rejected while building the cache.
  #[error("invalid cache configuration: {0}")]
  InvalidConfig(String),

  /// The key does not exist in the backing store.
  ///
  /// Stores must return this variant, and only this variant, for absent keys.
  #[error("key not found")]
  NotFound,

  #[error("serialization failed: {0}")]
  Serialization(#[source] BoxError),

  #[error("deserialization failed: {0}")]
  Deserialization(#[source] BoxError),

  /// Any backing-store failure other than a missing key.
  #[error("backing store error: {0}")]
  Store(#[source] BoxError),

  #[error("pub/sub operation failed: {0}")]
  PubSub(#[source] BoxError),

  #[error("operation timed out after {0:?}")]
  Timeout(Duration),

  #[error("local cache error: {0}")]
  LocalCache(String),
}

impl Error {
  /// Wraps any store driver error.
  pub fn store<E>(err: E) -> Self
  where
    E: Into<BoxError>,
  {
    Error::Store(err.into())
  }

  pub fn pubsub<E>(err: E) -> Self
  where
    E: Into<BoxError>,
  {
    Error::PubSub(err.into())
  }

  pub fn serialization<E>(err: E) -> Self
  where
    E: Into<BoxError>,
  {
    Error::Serialization(err.into())
  }

  pub fn deserialization<E>(err: E) -> Self
  where
    E: Into<BoxError>,
  {
    Error::Deserialization(err.into())
  }

  /// Returns `true` if this is the distinguished "key absent" outcome.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Error::NotFound)
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, Error::Timeout(_))
  }

  pub fn is_closed(&self) -> bool {
    matches!(self, Error::Closed)
  }
}

/// A specialized `Result` type for cache operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
