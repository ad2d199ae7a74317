//! A two-level cache for fleets of identical processes ("pods").
//!
//! Every pod keeps a fast, bounded in-process cache in front of a shared
//! backing store, and announces its writes on a publish/subscribe channel so
//! its peers' local caches converge without polling.
//!
//! # Features
//! - **Two tiers**: local hits never leave the process; misses fall back to
//!   the shared [`Store`] and repopulate the local tier.
//! - **Propagation or invalidation**: `set` pushes the encoded value to peers,
//!   `set_with_invalidate` makes them drop it and re-read lazily.
//! - **Pluggable local policies**: W-TinyLFU ([`FrequencyCache`]), exact LRU
//!   ([`RecencyCache`]), random eviction ([`MapCache`]), or your own through
//!   [`LocalCacheFactory`].
//! - **Reader pods**: with write-through disabled (the default) a pod never
//!   writes the store, so it cannot clobber fresher data.
//! - **Conflict hooks**: a transform hook sees every peer value before it is
//!   cached and may reject stale ones.
//! - **Transports**: in-process [`MemoryStore`]/[`MemoryBus`], and Redis
//!   behind the `redis` feature.

pub mod builder;
pub mod error;
pub mod event;
pub mod local;
pub mod metrics;
pub mod serializer;
pub mod store;
pub mod sync;

mod cache;
mod diag;

pub use builder::{CacheBuilder, DEFAULT_OPERATION_TIMEOUT};
pub use cache::{ErrorHandler, SetTransform, SyncedCache, Weigher};
pub use error::{Error, Result};
pub use event::{Action, InvalidationEvent, WILDCARD_KEY};
#[cfg(feature = "random")]
pub use local::{MapCache, MapCacheFactory};
pub use local::{
  FrequencyCache, FrequencyCacheFactory, LocalCache, LocalCacheConfig, LocalCacheFactory, LocalCacheMetrics,
  RecencyCache, RecencyCacheFactory,
};
pub use metrics::StatsSnapshot;
#[cfg(feature = "bincode")]
pub use serializer::BincodeSerializer;
pub use serializer::{JsonSerializer, Serializer};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{MemoryStore, Store, StoreConfig};
#[cfg(feature = "redis")]
pub use sync::RedisSynchronizer;
pub use sync::{MemoryBus, MemorySynchronizer, Synchronizer, DEFAULT_CHANNEL};

/// The crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
