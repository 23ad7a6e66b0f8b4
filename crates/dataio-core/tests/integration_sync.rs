//! End-to-end flows over the public API, with the in-memory store standing
//! in for Redis.

#![allow(clippy::unwrap_used, reason = "test panics are the assertion mechanism")]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dataio_core::{MapRegistry, MemoryStore, Store, SyncError, SyncOptions, SyncedMap};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dataio_core=debug")
        .try_init();
}

fn fast_options() -> SyncOptions {
    SyncOptions {
        sync_interval_ms: 5,
        op_timeout_ms: 1_000,
        hydrate_retry_ms: 5,
        ..SyncOptions::default()
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_user_preferences_flow() {
    init_logging();
    let store = Arc::new(MemoryStore::new());
    let registry = MapRegistry::with_options(store.clone(), fast_options());

    let prefs = registry.load::<String, String>("prefs").unwrap();
    prefs.set("lang".to_string(), "en".to_string());

    // read-your-write, immediately
    assert_eq!(prefs.get(&"lang".to_string()).await, Some("en".to_string()));

    // within a tick or two the store holds the encoded pair
    let field = dataio_core::codec::encode("lang").unwrap();
    eventually("the preference to land in the store", || {
        let store = Arc::clone(&store);
        let field = field.clone();
        async move {
            match store.hash_get("prefs", &field).await.unwrap() {
                Some(bytes) => dataio_core::codec::decode::<String>(&bytes).unwrap() == "en",
                None => false,
            }
        }
    })
    .await;

    // a separate instance over the same table hydrates to the same view
    let fresh: SyncedMap<String, String> =
        SyncedMap::with_options("prefs", store.clone(), fast_options());
    assert_eq!(fresh.get(&"lang".to_string()).await, Some("en".to_string()));
}

#[tokio::test]
async fn test_shared_blacklist_between_instances() {
    init_logging();
    let store = Arc::new(MemoryStore::new());

    // two instances of the same map, as two processes would hold them
    let a: SyncedMap<String, bool> =
        SyncedMap::with_options("blacklist", store.clone(), fast_options());
    let b: SyncedMap<String, bool> =
        SyncedMap::with_options("blacklist", store.clone(), fast_options());
    a.wait_ready().await;
    b.wait_ready().await;

    let channel = a.channel().to_string();
    eventually("both instances to subscribe", || {
        let store = Arc::clone(&store);
        let channel = channel.clone();
        async move { store.subscriber_count(&channel) >= 2 }
    })
    .await;

    a.set("u1".to_string(), true);
    eventually("instance B to observe the ban", || {
        let b = b.clone();
        async move { b.get(&"u1".to_string()).await == Some(true) }
    })
    .await;

    // and the lift of the ban propagates the same way
    a.remove(&"u1".to_string()).await;
    eventually("instance B to observe the lift", || {
        let b = b.clone();
        async move { b.get(&"u1".to_string()).await.is_none() }
    })
    .await;
}

#[tokio::test]
async fn test_registry_bootstrap_flow() {
    init_logging();
    let store = Arc::new(MemoryStore::new());
    let registry = MapRegistry::with_options(store.clone(), fast_options());

    registry.mark_in_use().await.unwrap();
    assert!(store.text("__info__").is_some());

    let settings = registry.load::<String, String>("settings").unwrap();
    let again = registry.load::<String, String>("settings").unwrap();
    assert_eq!(settings.instance_id(), again.instance_id());

    // the same name under different types is refused
    let mismatch = registry.load::<String, i64>("settings");
    assert!(matches!(mismatch, Err(SyncError::TypeMismatch { .. })));

    settings.set("prefix".to_string(), "!".to_string());
    assert_eq!(
        again.get(&"prefix".to_string()).await,
        Some("!".to_string())
    );

    registry.close_all();
    assert!(settings.is_closed());
}
