use std::sync::Arc;

use deadpool_redis::Pool as RedisPool;
use domain::{
    DomainErrorKind,
    models::{FetchRequest, Interception, OfflineConfig, ShimState},
    repositories::CacheStorage as _,
};
use infra::{
    offline::{HttpNetwork, MemoryCacheStorage},
    redis::cache::RedisCacheStorage,
};
use use_case::offline::OfflineCache;

use crate::{
    helpers::load_app_settings_for_testing,
    test_case::{EnableTracing, TestCase},
};

/// Waits until the background store of `url` lands in the cache
async fn wait_until_cached(storage: &MemoryCacheStorage, cache_name: &str, url: &str) {
    for _ in 0..100 {
        if storage.get(cache_name, url).await.unwrap().is_some() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("{} was never cached", url);
}

#[tokio::test]
async fn install_precaches_the_app_shell() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;
    let storage = Arc::new(MemoryCacheStorage::new());
    let cache = test_case.offline_cache(storage.clone());

    cache.install().await.unwrap();

    assert_eq!(cache.state().await, ShimState::Activating);
    let cache_name = &cache.config().cache_name;
    for request in cache.config().precache_requests() {
        let cached = storage.get(cache_name, &request.url).await.unwrap();
        let cached = cached.unwrap_or_else(|| panic!("{} was not precached", request.url));
        assert!(cached.is_success());
    }
    let manifest = storage
        .get(cache_name, &format!("{}/manifest.webmanifest", test_case.origin()))
        .await
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&manifest.body).contains("\"start_url\""));

    test_case.end().await;
}

#[tokio::test]
async fn install_fails_when_an_asset_is_missing() {
    let mut app_settings = load_app_settings_for_testing();
    app_settings
        .offline
        .precache_urls
        .push(String::from("/missing.js"));
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;
    let storage = Arc::new(MemoryCacheStorage::new());
    let cache = test_case.offline_cache(storage.clone());

    let err = cache.install().await.unwrap_err();

    assert_eq!(err.kind, DomainErrorKind::Network);
    assert_eq!(cache.state().await, ShimState::Installing);
    let index = format!("{}/index.html", test_case.origin());
    assert!(storage.match_any(&index).await.unwrap().is_none());

    test_case.end().await;
}

#[tokio::test]
async fn activate_removes_previous_generations() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;
    let storage = Arc::new(MemoryCacheStorage::new());
    storage.open("wame-cache-v0").await.unwrap();
    let cache = test_case.offline_cache(storage.clone());

    cache.start().await.unwrap();

    assert_eq!(cache.state().await, ShimState::Active);
    assert_eq!(
        storage.keys().await.unwrap(),
        vec![cache.config().cache_name.clone()]
    );

    test_case.end().await;
}

#[tokio::test]
async fn cached_assets_are_served_after_the_server_goes_away() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;
    let origin = test_case.origin();
    let storage = Arc::new(MemoryCacheStorage::new());
    let cache = test_case.offline_cache(storage.clone());
    cache.start().await.unwrap();

    // Requests that are not same-origin GETs are left alone
    let lookup = FetchRequest::get(format!("{}/lookup", origin)).with_method("post");
    assert_eq!(
        cache.handle_fetch(&lookup).await.unwrap(),
        Interception::PassThrough
    );
    let other_origin = FetchRequest::get("https://lookups.twilio.com/v2/PhoneNumbers/+1");
    assert_eq!(
        cache.handle_fetch(&other_origin).await.unwrap(),
        Interception::PassThrough
    );

    // Online: the network wins and runtime responses are cached
    let health_check = FetchRequest::get(format!("{}/health-check", origin));
    let online = cache.handle_fetch(&health_check).await.unwrap();
    assert!(matches!(online, Interception::Network(_)));
    wait_until_cached(&storage, &cache.config().cache_name, &health_check.url).await;

    test_case.end().await;

    // Offline: precached and runtime-cached responses come from the cache
    let icon = FetchRequest::get(format!("{}/icons/icon-192.svg", origin));
    let offline = cache.handle_fetch(&icon).await.unwrap();
    assert!(matches!(offline, Interception::Cache(_)));

    let offline = cache.handle_fetch(&health_check).await.unwrap();
    let body = offline.into_response().unwrap().body;
    assert_eq!(body, b"Ok, the server is running!");

    // Navigation falls back to the app shell
    let navigation = FetchRequest::navigate(format!("{}/some/deep/link", origin));
    let shell = cache.handle_fetch(&navigation).await.unwrap();
    match shell {
        Interception::Cache(response) => {
            assert!(String::from_utf8_lossy(&response.body).contains("<title>wame</title>"));
        }
        other => panic!("expected the cached app shell, got {:?}", other),
    }

    // Never cached and unreachable
    let unknown = FetchRequest::get(format!("{}/never-fetched.css", origin));
    let err = cache.handle_fetch(&unknown).await.unwrap_err();
    assert_eq!(err.kind, DomainErrorKind::Network);
}

fn redis_pool() -> RedisPool {
    let app_settings = load_app_settings_for_testing();
    app::create_redis_pool(&app_settings.redis).unwrap()
}

/// Requires a Redis server at the address in app_settings.toml
#[tokio::test]
#[ignore]
async fn redis_storage_keeps_the_cache_across_instances() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;
    let origin = test_case.origin();

    let pool = redis_pool();
    let mut conn = pool.get().await.unwrap();
    redis::cmd("FLUSHDB")
        .query_async::<()>(&mut conn)
        .await
        .unwrap();
    drop(conn);

    let storage = Arc::new(RedisCacheStorage::new(pool.clone()));
    storage.open("wame-cache-v0").await.unwrap();
    let settings = &test_case.app_state.app_settings;
    let config = infra::offline::offline_config(&settings.http, &settings.offline);
    let network = HttpNetwork::new(test_case.http_client.clone());
    let cache = OfflineCache::new(config.clone(), storage, network.clone());
    cache.start().await.unwrap();

    test_case.end().await;

    // A fresh instance reads what the first one stored
    let storage = Arc::new(RedisCacheStorage::new(pool));
    assert_eq!(storage.keys().await.unwrap(), vec![config.cache_name.clone()]);
    let restarted = OfflineCache::new(
        OfflineConfig {
            precache_urls: vec![],
            ..config
        },
        storage,
        network,
    );
    restarted.start().await.unwrap();
    let navigation = FetchRequest::navigate(format!("{}/", origin));
    let shell = restarted.handle_fetch(&navigation).await.unwrap();
    assert!(matches!(shell, Interception::Cache(_)));
}
