use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fibre_synced_cache::{
  CacheBuilder, FrequencyCache, LocalCache, LocalCacheConfig, MapCache, MemoryBus, MemoryStore, RecencyCache,
};
use std::sync::Arc;

const ITEMS: usize = 10_000;
const CAPACITY: usize = 100_000;

fn keys() -> Vec<String> {
  (0..ITEMS).map(|i| format!("key-{i}")).collect()
}

fn policies() -> Vec<(&'static str, Box<dyn LocalCache<u64>>)> {
  let config = LocalCacheConfig {
    max_cost: CAPACITY as u64,
    ..LocalCacheConfig::default()
  };
  vec![
    ("frequency", Box::new(FrequencyCache::new(&config).unwrap())),
    ("recency", Box::new(RecencyCache::new(CAPACITY).unwrap())),
    ("map", Box::new(MapCache::new(CAPACITY).unwrap())),
  ]
}

fn bench_local_get_hit(c: &mut Criterion) {
  let keys = keys();
  let mut group = c.benchmark_group("local_get_hit");
  group.throughput(Throughput::Elements(ITEMS as u64));

  for (name, cache) in policies() {
    for (i, key) in keys.iter().enumerate() {
      cache.set(key.clone(), Arc::new(i as u64), 1);
    }
    group.bench_with_input(BenchmarkId::from_parameter(name), &keys, |b, keys| {
      b.iter(|| {
        for key in keys {
          black_box(cache.get(key));
        }
      })
    });
    cache.close();
  }
  group.finish();
}

fn bench_local_set(c: &mut Criterion) {
  let keys = keys();
  let mut group = c.benchmark_group("local_set");
  group.throughput(Throughput::Elements(ITEMS as u64));

  for (name, cache) in policies() {
    group.bench_with_input(BenchmarkId::from_parameter(name), &keys, |b, keys| {
      b.iter(|| {
        for (i, key) in keys.iter().enumerate() {
          black_box(cache.set(key.clone(), Arc::new(i as u64), 1));
        }
      })
    });
    cache.close();
  }
  group.finish();
}

fn bench_synced_get(c: &mut Criterion) {
  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap();
  let bus = MemoryBus::new();
  let cache = runtime.block_on(async {
    let cache = CacheBuilder::<u64>::new("bench")
      .write_through(true)
      .build_in_process(MemoryStore::new(), &bus)
      .await
      .unwrap();
    for i in 0..ITEMS as u64 {
      cache.set(&format!("key-{i}"), i).await.unwrap();
    }
    cache
  });
  let keys = keys();

  let mut group = c.benchmark_group("synced_get");
  group.throughput(Throughput::Elements(ITEMS as u64));
  group.bench_function("local_hit", |b| {
    b.iter(|| {
      runtime.block_on(async {
        for key in &keys {
          black_box(cache.get(key).await);
        }
      })
    })
  });
  group.finish();

  runtime.block_on(cache.close()).unwrap();
}

criterion_group!(benches, bench_local_get_hit, bench_local_set, bench_synced_get);
criterion_main!(benches);
