use fibre_synced_cache::{CacheBuilder, StoreConfig};
use std::time::Duration;

/// Run against a local Redis, e.g. `docker run -p 6379:6379 redis`.
/// `REDIS_URL` overrides the address.
#[tokio::main]
async fn main() -> fibre_synced_cache::Result<()> {
  tracing_subscriber::fmt().init();

  let config = StoreConfig {
    address: std::env::var("REDIS_URL").unwrap_or_else(|_| fibre_synced_cache::store::DEFAULT_STORE_ADDRESS.to_string()),
    ..StoreConfig::default()
  };

  let writer = CacheBuilder::<String>::new("pod-a")
    .store_config(config.clone())
    .write_through(true)
    .on_error(|err| eprintln!("pod-a: {err}"))
    .connect_redis()
    .await?;
  let reader = CacheBuilder::<String>::new("pod-b")
    .store_config(config)
    .on_error(|err| eprintln!("pod-b: {err}"))
    .connect_redis()
    .await?;

  writer.set("greeting", "hello from pod-a".to_string()).await?;
  tokio::time::sleep(Duration::from_millis(100)).await;
  println!("pod-b sees: {:?}", reader.get("greeting").await);

  writer.delete("greeting").await?;
  tokio::time::sleep(Duration::from_millis(100)).await;
  println!("pod-b after delete: {:?}", reader.get("greeting").await);
  println!("pod-b stats: {:?}", reader.stats());

  writer.close().await?;
  reader.close().await?;
  Ok(())
}
