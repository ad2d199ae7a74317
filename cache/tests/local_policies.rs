mod common;

use common::CHANNEL;
use fibre_synced_cache::{
  CacheBuilder, LocalCache, LocalCacheConfig, MapCacheFactory, MemoryBus, MemoryStore, RecencyCache,
  RecencyCacheFactory, Result,
};

#[tokio::test]
async fn test_recency_policy_bounds_item_count() {
  let bus = MemoryBus::new();
  let cache = CacheBuilder::<u32>::new("a")
    .local_cache(RecencyCacheFactory::new(2))
    .build(MemoryStore::new(), bus.synchronizer(CHANNEL, "a"))
    .await
    .unwrap();

  cache.set("one", 1).await.unwrap();
  cache.set("two", 2).await.unwrap();
  cache.get("one").await;
  cache.set("three", 3).await.unwrap();

  assert_eq!(cache.stats().local_size, 2);
  // "two" was least recently used and, with write-through off, is gone.
  assert!(cache.get("two").await.is_none());
  assert!(cache.get("one").await.is_some());
}

#[tokio::test]
async fn test_map_policy_bounds_item_count() {
  let bus = MemoryBus::new();
  let cache = CacheBuilder::<u32>::new("a")
    .local_cache(MapCacheFactory::new(5))
    .build(MemoryStore::new(), bus.synchronizer(CHANNEL, "a"))
    .await
    .unwrap();

  for i in 0..50 {
    cache.set(&format!("k{i}"), i).await.unwrap();
  }
  assert_eq!(cache.stats().local_size, 5);
  assert!(cache.get("k49").await.is_some());
}

#[tokio::test]
async fn test_closure_factory() {
  let bus = MemoryBus::new();
  let factory = || -> Result<Box<dyn LocalCache<String>>> { Ok(Box::new(RecencyCache::<String>::new(1)?)) };
  let cache = CacheBuilder::<String>::new("a")
    .local_cache(factory)
    .build(MemoryStore::new(), bus.synchronizer(CHANNEL, "a"))
    .await
    .unwrap();

  cache.set("a", "x".to_string()).await.unwrap();
  cache.set("b", "y".to_string()).await.unwrap();
  assert_eq!(cache.stats().local_size, 1);
}

#[tokio::test]
async fn test_failing_factory_fails_build() {
  let bus = MemoryBus::new();
  let result = CacheBuilder::<String>::new("a")
    .local_cache(RecencyCacheFactory::new(0))
    .build(MemoryStore::new(), bus.synchronizer(CHANNEL, "a"))
    .await;
  assert!(result.is_err());
}

#[tokio::test]
async fn test_weigher_keeps_oversized_values_out_of_local_tier() {
  let bus = MemoryBus::new();
  let cache = CacheBuilder::<String>::new("a")
    .write_through(true)
    .local_cache_config(LocalCacheConfig {
      max_cost: 10,
      num_counters: 1_000,
      ..LocalCacheConfig::default()
    })
    .weigher(|_key, value: &String| value.len() as u64)
    .build(MemoryStore::new(), bus.synchronizer(CHANNEL, "a"))
    .await
    .unwrap();

  cache.set("small", "tiny".to_string()).await.unwrap();
  cache.set("large", "x".repeat(64)).await.unwrap();

  assert!(cache.get("small").await.is_some());
  // Refused locally, so every read goes to the store.
  assert_eq!(cache.get("large").await.map(|v| v.len()), Some(64));
  assert_eq!(cache.get("large").await.map(|v| v.len()), Some(64));

  let stats = cache.stats();
  assert_eq!(stats.local_hits, 1);
  assert_eq!(stats.remote_hits, 2);
  assert_eq!(stats.local_size, 1);
}
