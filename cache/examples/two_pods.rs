use fibre_synced_cache::{CacheBuilder, MemoryBus, MemoryStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
  id: u64,
  name: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> fibre_synced_cache::Result<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

  // Both pods share one store and one bus, as they would share Redis.
  let store = MemoryStore::new();
  let bus = MemoryBus::new();

  let writer = CacheBuilder::<User>::new("pod-a")
    .write_through(true)
    .debug_mode(true)
    .build_in_process(store.clone(), &bus)
    .await?;
  let reader = CacheBuilder::<User>::new("pod-b")
    .build_in_process(store.clone(), &bus)
    .await?;

  let alice = User {
    id: 1,
    name: "Alice".to_string(),
  };
  println!("pod-a sets user:1 = {alice:?}");
  writer.set("user:1", alice).await?;

  // Give the listener a moment to deliver the event.
  tokio::time::sleep(Duration::from_millis(20)).await;
  println!("pod-b reads user:1 = {:?}", reader.get("user:1").await);
  println!("pod-b stats: {:?}", reader.stats());

  println!("\npod-a sets user:1 with invalidation only");
  writer
    .set_with_invalidate(
      "user:1",
      User {
        id: 1,
        name: "Alice Liddell".to_string(),
      },
    )
    .await?;
  tokio::time::sleep(Duration::from_millis(20)).await;
  println!("pod-b reads user:1 = {:?}", reader.get("user:1").await);
  println!("pod-b stats: {:?}", reader.stats());

  println!("\npod-a deletes user:1");
  writer.delete("user:1").await?;
  tokio::time::sleep(Duration::from_millis(20)).await;
  println!("pod-b reads user:1 = {:?}", reader.get("user:1").await);

  writer.close().await?;
  reader.close().await?;
  Ok(())
}
