//! Tests for the `parameter_cache` application service.
//!
//! Time is paused so TTL expiry is driven with `tokio::time::advance`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use agent_fleet::application::ports::SecretStore;
use agent_fleet::application::services::ParameterCache;

use crate::mocks::{FakeSecretStore, modified_at};

const TTL: Duration = Duration::from_secs(60);
const KEY: &str = "/dev/1/buildkite-agent-key";

fn cache_over(store: &Arc<FakeSecretStore>) -> ParameterCache {
    ParameterCache::new(Arc::clone(store) as Arc<dyn SecretStore>, TTL)
}

fn store_with(value: &str) -> Arc<FakeSecretStore> {
    let store = Arc::new(FakeSecretStore::default());
    store.set(KEY, value, Some(modified_at(10)));
    store
}

async fn expire() {
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn repeated_gets_within_ttl_fetch_once() {
    let store = store_with("secret-1");
    let cache = cache_over(&store);

    for _ in 0..5 {
        assert_eq!(cache.get_key(KEY, true).await.unwrap(), "secret-1");
    }

    assert_eq!(store.gets(), 1);
    assert_eq!(store.describes(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_unchanged_entry_only_checks_metadata() {
    let store = store_with("secret-1");
    let cache = cache_over(&store);
    cache.get_key(KEY, true).await.unwrap();

    expire().await;
    assert_eq!(cache.get_key(KEY, true).await.unwrap(), "secret-1");
    assert_eq!(store.gets(), 1, "no second full fetch");
    assert_eq!(store.describes(), 1);

    // the TTL was extended: no further remote calls inside the new window
    cache.get_key(KEY, true).await.unwrap();
    assert_eq!(store.describes(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_changed_entry_is_refetched() {
    let store = store_with("secret-1");
    let cache = cache_over(&store);
    cache.get_key(KEY, true).await.unwrap();

    store.set(KEY, "secret-2", Some(modified_at(20)));
    // still served from cache until the entry expires
    assert_eq!(cache.get_key(KEY, true).await.unwrap(), "secret-1");

    expire().await;
    assert_eq!(cache.get_key(KEY, true).await.unwrap(), "secret-2");
    assert_eq!(store.gets(), 2);
    assert_eq!(store.describes(), 1);
}

#[tokio::test(start_paused = true)]
async fn entry_without_modification_time_is_refetched_on_expiry() {
    let store = Arc::new(FakeSecretStore::default());
    store.set(KEY, "secret-1", None);
    let cache = cache_over(&store);
    cache.get_key(KEY, true).await.unwrap();

    expire().await;
    cache.get_key(KEY, true).await.unwrap();

    assert_eq!(store.gets(), 2);
    assert_eq!(store.describes(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_metadata_call_falls_back_to_full_fetch() {
    let store = store_with("secret-1");
    let cache = cache_over(&store);
    cache.get_key(KEY, true).await.unwrap();
    *store.fail_describe.lock().unwrap() = true;

    expire().await;
    assert_eq!(cache.get_key(KEY, true).await.unwrap(), "secret-1");

    assert_eq!(store.describes(), 1);
    assert_eq!(store.gets(), 2);
}

#[tokio::test]
async fn missing_key_is_an_error() {
    let store = Arc::new(FakeSecretStore::default());
    let cache = cache_over(&store);

    let err = cache.get_key("/dev/1/nope", true).await.unwrap_err();

    assert!(format!("{err:#}").contains("ParameterNotFound"), "{err:#}");
}

#[tokio::test]
async fn put_then_get_needs_no_further_fetch() {
    let store = Arc::new(FakeSecretStore::default());
    let cache = cache_over(&store);

    cache.put_key("/dev/1/agent-a", "{\"token\":1}", true).await.unwrap();
    let gets_after_put = store.gets();

    assert_eq!(
        cache.get_key("/dev/1/agent-a", true).await.unwrap(),
        "{\"token\":1}"
    );
    assert_eq!(store.gets(), gets_after_put);
    assert_eq!(store.puts(), 1);
    assert_eq!(store.value("/dev/1/agent-a").as_deref(), Some("{\"token\":1}"));
}

#[tokio::test]
async fn failed_put_leaves_cache_untouched() {
    let store = store_with("secret-1");
    let cache = cache_over(&store);
    cache.get_key(KEY, true).await.unwrap();
    *store.fail_put.lock().unwrap() = true;

    let err = cache.put_key(KEY, "secret-2", true).await.unwrap_err();
    assert!(format!("{err:#}").contains("failed to store parameter"), "{err:#}");

    assert_eq!(cache.get_key(KEY, true).await.unwrap(), "secret-1");
    assert_eq!(store.gets(), 1);
}

#[tokio::test]
async fn concurrent_gets_share_one_fetch() {
    let store = store_with("secret-1");
    let cache = Arc::new(cache_over(&store));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_key(KEY, true).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "secret-1");
    }

    assert_eq!(store.gets(), 1);
}
