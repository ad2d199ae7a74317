//! The cross-instance synchronization message and its wire encoding.
//!
//! Events travel as compact JSON objects:
//!
//! ```json
//! {"key":"user:1","sender":"pod-a","action":"set","value":"eyJpZCI6MX0="}
//! ```
//!
//! `value` is the serialized cache value encoded as standard base64 and is
//! only present for `set` events.

use crate::error::{Error, Result};

use std::fmt;

use serde::{Deserialize, Serialize};

/// The reserved key meaning "every key", carried by `clear` events.
pub const WILDCARD_KEY: &str = "*";

/// What a peer should do with its local copy of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
  /// Adopt the value carried by the event.
  Set,
  /// Drop the local copy; the next read goes to the backing store.
  Invalidate,
  /// The key was deleted everywhere.
  Delete,
  /// Every key was removed.
  Clear,
  /// An action this version does not know about. Receivers ignore it.
  Unknown(String),
}

impl Action {
  pub fn as_str(&self) -> &str {
    match self {
      Action::Set => "set",
      Action::Invalidate => "invalidate",
      Action::Delete => "delete",
      Action::Clear => "clear",
      Action::Unknown(other) => other,
    }
  }
}

impl From<String> for Action {
  fn from(value: String) -> Self {
    match value.as_str() {
      "set" => Action::Set,
      "invalidate" => Action::Invalidate,
      "delete" => Action::Delete,
      "clear" => Action::Clear,
      _ => Action::Unknown(value),
    }
  }
}

impl From<Action> for String {
  fn from(action: Action) -> Self {
    match action {
      Action::Unknown(other) => other,
      known => known.as_str().to_string(),
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single synchronization event published by one instance for its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
  pub key: String,
  /// Identity of the publishing instance, used by receivers to skip their own
  /// events.
  pub sender: String,
  pub action: Action,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "base64_payload"
  )]
  pub value: Option<Vec<u8>>,
}

impl InvalidationEvent {
  /// A propagation event: peers adopt `value` directly.
  pub fn set(key: impl Into<String>, sender: impl Into<String>, value: Vec<u8>) -> Self {
    Self {
      key: key.into(),
      sender: sender.into(),
      action: Action::Set,
      value: Some(value),
    }
  }

  pub fn invalidate(key: impl Into<String>, sender: impl Into<String>) -> Self {
    Self::without_value(key, sender, Action::Invalidate)
  }

  pub fn delete(key: impl Into<String>, sender: impl Into<String>) -> Self {
    Self::without_value(key, sender, Action::Delete)
  }

  /// A bulk removal event, always addressed to [`WILDCARD_KEY`].
  pub fn clear(sender: impl Into<String>) -> Self {
    Self::without_value(WILDCARD_KEY, sender, Action::Clear)
  }

  fn without_value(key: impl Into<String>, sender: impl Into<String>, action: Action) -> Self {
    Self {
      key: key.into(),
      sender: sender.into(),
      action,
      value: None,
    }
  }

  /// The payload of a `set` event, or an empty slice.
  pub fn payload(&self) -> &[u8] {
    self.value.as_deref().unwrap_or_default()
  }

  pub fn is_wildcard(&self) -> bool {
    self.key == WILDCARD_KEY
  }

  /// Encodes the event for the notification channel.
  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    serde_json::to_vec(self).map_err(Error::serialization)
  }

  /// Decodes an event received from the notification channel.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    serde_json::from_slice(bytes).map_err(Error::deserialization)
  }
}

mod base64_payload {
  use base64::engine::general_purpose::STANDARD;
  use base64::Engine as _;
  use serde::{Deserialize, Deserializer, Serializer};

  pub(super) fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    match value {
      Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
      None => serializer.serialize_none(),
    }
  }

  pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    match encoded {
      Some(text) if !text.is_empty() => STANDARD
        .decode(text.as_bytes())
        .map(Some)
        .map_err(serde::de::Error::custom),
      _ => Ok(None),
    }
  }
}
