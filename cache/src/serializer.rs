//! Conversion between cache values and the byte payloads stored remotely and
//! carried by `set` events.

use crate::error::{Error, Result};

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts values of type `V` to and from bytes.
///
/// Every instance sharing a backing store and a channel must use compatible
/// serializers.
pub trait Serializer<V>: Send + Sync {
  fn serialize(&self, value: &V) -> Result<Vec<u8>>;

  fn deserialize(&self, bytes: &[u8]) -> Result<V>;
}

/// The default serializer, backed by `serde_json`.
pub struct JsonSerializer<V> {
  _marker: PhantomData<fn() -> V>,
}

impl<V> JsonSerializer<V> {
  pub fn new() -> Self {
    Self {
      _marker: PhantomData,
    }
  }
}

impl<V> Default for JsonSerializer<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V> std::fmt::Debug for JsonSerializer<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("JsonSerializer")
  }
}

impl<V> Serializer<V> for JsonSerializer<V>
where
  V: Serialize + DeserializeOwned,
{
  fn serialize(&self, value: &V) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(Error::serialization)
  }

  fn deserialize(&self, bytes: &[u8]) -> Result<V> {
    serde_json::from_slice(bytes).map_err(Error::deserialization)
  }
}

/// A compact binary serializer backed by `bincode`.
#[cfg(feature = "bincode")]
pub struct BincodeSerializer<V> {
  _marker: PhantomData<fn() -> V>,
}

#[cfg(feature = "bincode")]
impl<V> BincodeSerializer<V> {
  pub fn new() -> Self {
    Self {
      _marker: PhantomData,
    }
  }
}

#[cfg(feature = "bincode")]
impl<V> Default for BincodeSerializer<V> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(feature = "bincode")]
impl<V> Serializer<V> for BincodeSerializer<V>
where
  V: Serialize + DeserializeOwned,
{
  fn serialize(&self, value: &V) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(Error::serialization)
  }

  fn deserialize(&self, bytes: &[u8]) -> Result<V> {
    bincode::deserialize(bytes).map_err(Error::deserialization)
  }
}
