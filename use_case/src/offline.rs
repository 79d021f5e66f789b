use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tokio::sync::RwLock;

use domain::{
    DomainError, DomainErrorKind, DomainResult,
    models::{AssetResponse, FetchRequest, Interception, OfflineConfig, ShimState},
    repositories::{CacheStorage, Network},
};

/// オフラインキャッシュユースケース
///
/// ネットワークを優先して、ネットワークに接続できないときはキャッシュしたレスポンスを返す。
/// 状態は`installing`、`activating`、`active`の順に遷移して、前の状態には戻らない。
/// キャッシュのバージョンを上げる場合は、同じキャッシュストレージを使用する新しいインスタンスを作成する。
pub struct OfflineCache<S, N>
where
    S: CacheStorage + 'static,
    N: Network,
{
    /// 設定
    config: OfflineConfig,
    /// キャッシュストレージ
    storage: Arc<S>,
    /// ネットワーク
    network: N,
    /// ライフサイクルの状態
    state: RwLock<ShimState>,
}

impl<S, N> OfflineCache<S, N>
where
    S: CacheStorage + 'static,
    N: Network,
{
    /// オフラインキャッシュを作成する。
    ///
    /// 作成直後の状態は`installing`である。
    pub fn new(config: OfflineConfig, storage: Arc<S>, network: N) -> Self {
        Self {
            config,
            storage,
            network,
            state: RwLock::new(ShimState::Installing),
        }
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    /// ライフサイクルの状態を返す。
    pub async fn state(&self) -> ShimState {
        *self.state.read().await
    }

    /// インストールする。
    ///
    /// 事前キャッシュするURLを並行してネットワークから取得して、すべて成功した場合だけキャッシュに保存する。
    /// 1つでも取得に失敗した場合は何も保存せずエラーを返し、状態は`installing`のままである。
    #[tracing::instrument(skip(self), fields(cache_name = %self.config.cache_name))]
    pub async fn install(&self) -> DomainResult<()> {
        let mut state = self.state.write().await;
        expect_state(*state, ShimState::Installing)?;

        self.storage.open(&self.config.cache_name).await?;
        let requests = self.config.precache_requests();
        let responses = join_all(requests.iter().map(|r| self.network.fetch(r))).await;
        let mut entries = Vec::with_capacity(requests.len());
        for (request, response) in requests.into_iter().zip(responses) {
            let response = response.map_err(|e| DomainError {
                kind: DomainErrorKind::Network,
                messages: vec![format!("Failed to precache {}", request.url).into()],
                source: e.into(),
            })?;
            if !response.is_success() {
                return Err(DomainError::new(
                    DomainErrorKind::Network,
                    format!(
                        "Failed to precache {}: status {}",
                        request.url, response.status
                    ),
                ));
            }
            entries.push((request.url, response));
        }
        self.storage
            .put_all(&self.config.cache_name, entries)
            .await?;

        *state = ShimState::Activating;
        tracing::info!("The offline cache was installed");
        Ok(())
    }

    /// アクティベートする。
    ///
    /// 現在のキャッシュ名以外のキャッシュをすべて削除して、クライアントの制御を開始する。
    #[tracing::instrument(skip(self), fields(cache_name = %self.config.cache_name))]
    pub async fn activate(&self) -> DomainResult<()> {
        let mut state = self.state.write().await;
        expect_state(*state, ShimState::Activating)?;

        let stale = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| *name != self.config.cache_name)
            .collect::<Vec<_>>();
        try_join_all(stale.iter().map(|name| self.storage.delete(name))).await?;
        for name in &stale {
            tracing::info!(stale_cache = %name, "Deleted a stale offline cache");
        }

        *state = ShimState::Active;
        tracing::info!("The offline cache is active");
        Ok(())
    }

    /// インストールした後、待機せずにアクティベートする。
    pub async fn start(&self) -> DomainResult<()> {
        self.install().await?;
        self.activate().await
    }

    /// リクエストを処理する。
    ///
    /// * ナビゲーションリクエストは、ネットワークから取得できない場合にフォールバックドキュメントを返す。
    /// * 同一オリジンのGETリクエストは、ネットワークから取得できた場合にレスポンスをキャッシュに保存する。
    ///   ネットワークから取得できない場合は、キャッシュしたレスポンスを返す。
    /// * その他のリクエストは横取りしない。
    ///
    /// # 戻り値
    ///
    /// リクエストの処理結果
    ///
    /// ネットワークから取得できず、キャッシュにもレスポンスがない場合はエラーを返す。
    pub async fn handle_fetch(&self, request: &FetchRequest) -> DomainResult<Interception> {
        if self.state().await != ShimState::Active {
            return Ok(Interception::PassThrough);
        }

        if request.is_navigation() {
            return match self.network.fetch(request).await {
                Ok(response) => Ok(Interception::Network(response)),
                Err(e) => {
                    let fallback = self.config.resolve(&self.config.fallback_document);
                    self.from_cache(&fallback, e).await
                }
            };
        }

        if request.is_get() && self.config.is_same_origin(&request.url) {
            return match self.network.fetch(request).await {
                Ok(response) => {
                    self.store_in_background(&request.url, &response);
                    Ok(Interception::Network(response))
                }
                Err(e) => self.from_cache(&request.url, e).await,
            };
        }

        Ok(Interception::PassThrough)
    }

    /// キャッシュからレスポンスを取得する。
    async fn from_cache(&self, url: &str, network_error: DomainError) -> DomainResult<Interception> {
        match self.storage.match_any(url).await? {
            Some(response) => {
                tracing::debug!(url, "Served a cached response");
                Ok(Interception::Cache(response))
            }
            None => Err(DomainError {
                kind: DomainErrorKind::Network,
                messages: vec![format!("{} is not available offline", url).into()],
                source: network_error.into(),
            }),
        }
    }

    /// レスポンスの複製をバックグラウンドでキャッシュに保存する。
    ///
    /// 保存に失敗してもエラーを返さない。
    fn store_in_background(&self, url: &str, response: &AssetResponse) {
        if !response.is_success() {
            return;
        }
        let storage = Arc::clone(&self.storage);
        let cache_name = self.config.cache_name.clone();
        let url = url.to_string();
        let response = response.clone();
        tokio::spawn(async move {
            if let Err(e) = storage.put(&cache_name, &url, response).await {
                tracing::debug!(url = %url, error = %e, "Failed to store a response in the offline cache");
            }
        });
    }
}

fn expect_state(actual: ShimState, expected: ShimState) -> DomainResult<()> {
    if actual != expected {
        return Err(DomainError::new(
            DomainErrorKind::InvalidState,
            format!(
                "The offline cache is {}, but it must be {}",
                actual, expected
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, Ordering},
    };

    use domain::models::DEFAULT_PRECACHE_URLS;

    use super::*;

    const ORIGIN: &str = "http://localhost:8000";

    /// 登録したURLのレスポンスを返すネットワーク
    struct FakeNetwork {
        responses: HashMap<String, AssetResponse>,
        online: Arc<AtomicBool>,
    }

    impl FakeNetwork {
        fn with_assets(online: Arc<AtomicBool>, version: &str) -> Self {
            let responses = DEFAULT_PRECACHE_URLS
                .iter()
                .map(|path| {
                    (
                        format!("{}{}", ORIGIN, path),
                        AssetResponse::new(200, vec![], format!("{}{}", version, path).into_bytes()),
                    )
                })
                .collect();
            Self { responses, online }
        }
    }

    #[async_trait::async_trait]
    impl Network for FakeNetwork {
        async fn fetch(&self, request: &FetchRequest) -> DomainResult<AssetResponse> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(DomainError::new(
                    DomainErrorKind::Network,
                    "The network is unreachable",
                ));
            }
            Ok(self
                .responses
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| AssetResponse::new(404, vec![], b"not found".to_vec())))
        }
    }

    /// 作成順を保持するキャッシュストレージ
    #[derive(Default)]
    struct FakeCacheStorage {
        caches: RwLock<Vec<(String, HashMap<String, AssetResponse>)>>,
        fail_writes: AtomicBool,
    }

    #[async_trait::async_trait]
    impl CacheStorage for FakeCacheStorage {
        async fn open(&self, cache_name: &str) -> DomainResult<()> {
            let mut caches = self.caches.write().await;
            if !caches.iter().any(|(name, _)| name == cache_name) {
                caches.push((cache_name.to_string(), HashMap::new()));
            }
            Ok(())
        }

        async fn keys(&self) -> DomainResult<Vec<String>> {
            let caches = self.caches.read().await;
            Ok(caches.iter().map(|(name, _)| name.clone()).collect())
        }

        async fn delete(&self, cache_name: &str) -> DomainResult<bool> {
            let mut caches = self.caches.write().await;
            let before = caches.len();
            caches.retain(|(name, _)| name != cache_name);
            Ok(caches.len() != before)
        }

        async fn put(&self, cache_name: &str, url: &str, response: AssetResponse) -> DomainResult<()> {
            self.put_all(cache_name, vec![(url.to_string(), response)])
                .await
        }

        async fn put_all(
            &self,
            cache_name: &str,
            entries: Vec<(String, AssetResponse)>,
        ) -> DomainResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DomainError::new(DomainErrorKind::Cache, "The disk is full"));
            }
            self.open(cache_name).await?;
            let mut caches = self.caches.write().await;
            if let Some((_, cache)) = caches.iter_mut().find(|(name, _)| name == cache_name) {
                cache.extend(entries);
            }
            Ok(())
        }

        async fn get(&self, cache_name: &str, url: &str) -> DomainResult<Option<AssetResponse>> {
            let caches = self.caches.read().await;
            Ok(caches
                .iter()
                .find(|(name, _)| name == cache_name)
                .and_then(|(_, cache)| cache.get(url).cloned()))
        }

        async fn match_any(&self, url: &str) -> DomainResult<Option<AssetResponse>> {
            let caches = self.caches.read().await;
            Ok(caches.iter().find_map(|(_, cache)| cache.get(url).cloned()))
        }
    }

    struct Fixture {
        online: Arc<AtomicBool>,
        storage: Arc<FakeCacheStorage>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                online: Arc::new(AtomicBool::new(true)),
                storage: Arc::new(FakeCacheStorage::default()),
            }
        }

        fn shim(&self, cache_name: &str) -> OfflineCache<FakeCacheStorage, FakeNetwork> {
            let mut config = OfflineConfig::new(ORIGIN);
            config.cache_name = cache_name.to_string();
            let network = FakeNetwork::with_assets(Arc::clone(&self.online), cache_name);
            OfflineCache::new(config, Arc::clone(&self.storage), network)
        }

        fn go_offline(&self) {
            self.online.store(false, Ordering::SeqCst);
        }

        /// バックグラウンドの書き込みが終わるまで待機する。
        async fn cached(&self, cache_name: &str, url: &str) -> Option<AssetResponse> {
            for _ in 0..100 {
                if let Some(response) = self.storage.get(cache_name, url).await.unwrap() {
                    return Some(response);
                }
                tokio::task::yield_now().await;
            }
            None
        }
    }

    fn url(path: &str) -> String {
        format!("{}{}", ORIGIN, path)
    }

    #[tokio::test]
    async fn lifecycle_moves_forward_only() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");
        assert_eq!(shim.state().await, ShimState::Installing);

        let err = shim.activate().await.unwrap_err();
        assert_eq!(err.kind, DomainErrorKind::InvalidState);

        shim.install().await?;
        assert_eq!(shim.state().await, ShimState::Activating);
        assert_eq!(
            shim.install().await.unwrap_err().kind,
            DomainErrorKind::InvalidState
        );

        shim.activate().await?;
        assert_eq!(shim.state().await, ShimState::Active);
        assert_eq!(
            shim.activate().await.unwrap_err().kind,
            DomainErrorKind::InvalidState
        );
        Ok(())
    }

    #[tokio::test]
    async fn install_precaches_the_manifest() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");

        shim.install().await?;

        for path in DEFAULT_PRECACHE_URLS {
            let cached = fixture.storage.get("wame-cache-v1", &url(path)).await?;
            assert!(cached.is_some(), "{} was not precached", path);
        }
        Ok(())
    }

    #[tokio::test]
    async fn install_stores_nothing_when_an_asset_is_missing() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let mut shim = fixture.shim("wame-cache-v1");
        shim.config.precache_urls.push(String::from("/missing.png"));

        let err = shim.install().await.unwrap_err();

        assert_eq!(err.kind, DomainErrorKind::Network);
        assert_eq!(shim.state().await, ShimState::Installing);
        assert!(fixture.storage.get("wame-cache-v1", &url("/")).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn install_fails_offline() {
        let fixture = Fixture::new();
        fixture.go_offline();
        let shim = fixture.shim("wame-cache-v1");

        let err = shim.install().await.unwrap_err();

        assert_eq!(err.kind, DomainErrorKind::Network);
        assert_eq!(shim.state().await, ShimState::Installing);
    }

    #[tokio::test]
    async fn requests_are_not_intercepted_before_activation() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");
        shim.install().await?;

        let outcome = shim.handle_fetch(&FetchRequest::get(url("/index.html"))).await?;

        assert_eq!(outcome, Interception::PassThrough);
        Ok(())
    }

    #[tokio::test]
    async fn precached_asset_is_served_offline() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");
        shim.start().await?;
        fixture.go_offline();

        let outcome = shim
            .handle_fetch(&FetchRequest::get(url("/icons/icon-192.svg")))
            .await?;

        match outcome {
            Interception::Cache(response) => {
                assert_eq!(response.body, b"wame-cache-v1/icons/icon-192.svg".to_vec());
            }
            other => panic!("Expected a cached response, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn navigation_falls_back_to_the_entry_document() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");
        shim.start().await?;
        fixture.go_offline();

        let outcome = shim
            .handle_fetch(&FetchRequest::navigate(url("/some/deep/link")))
            .await?;

        assert_eq!(
            outcome.into_response().map(|r| r.body),
            Some(b"wame-cache-v1/index.html".to_vec())
        );
        Ok(())
    }

    #[tokio::test]
    async fn navigation_uses_the_network_when_online() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");
        shim.start().await?;

        let outcome = shim.handle_fetch(&FetchRequest::navigate(url("/"))).await?;

        assert!(matches!(outcome, Interception::Network(_)));
        Ok(())
    }

    #[tokio::test]
    async fn same_origin_get_is_cached_for_later_offline_use() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let mut shim = fixture.shim("wame-cache-v1");
        shim.network.responses.insert(
            url("/app.js"),
            AssetResponse::new(200, vec![], b"console.log(1)".to_vec()),
        );
        shim.start().await?;

        let online = shim.handle_fetch(&FetchRequest::get(url("/app.js"))).await?;
        assert!(matches!(online, Interception::Network(_)));
        assert!(fixture.cached("wame-cache-v1", &url("/app.js")).await.is_some());

        fixture.go_offline();
        let offline = shim.handle_fetch(&FetchRequest::get(url("/app.js"))).await?;
        assert_eq!(
            offline,
            Interception::Cache(fixture.cached("wame-cache-v1", &url("/app.js")).await.unwrap())
        );
        Ok(())
    }

    #[tokio::test]
    async fn error_responses_are_returned_but_not_cached() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");
        shim.start().await?;

        let outcome = shim.handle_fetch(&FetchRequest::get(url("/nope"))).await?;

        assert_eq!(outcome.into_response().map(|r| r.status), Some(404));
        assert!(fixture.cached("wame-cache-v1", &url("/nope")).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn cache_write_failures_do_not_affect_the_response() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let mut shim = fixture.shim("wame-cache-v1");
        shim.network.responses.insert(
            url("/app.js"),
            AssetResponse::new(200, vec![], b"console.log(1)".to_vec()),
        );
        shim.start().await?;
        fixture.storage.fail_writes.store(true, Ordering::SeqCst);

        let outcome = shim.handle_fetch(&FetchRequest::get(url("/app.js"))).await?;

        assert_eq!(
            outcome.into_response().map(|r| r.body),
            Some(b"console.log(1)".to_vec())
        );
        Ok(())
    }

    #[tokio::test]
    async fn uncached_request_fails_offline() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");
        shim.start().await?;
        fixture.go_offline();

        let err = shim
            .handle_fetch(&FetchRequest::get(url("/never-seen.js")))
            .await
            .unwrap_err();

        assert_eq!(err.kind, DomainErrorKind::Network);
        assert!(err.to_string().contains("is not available offline"));
        Ok(())
    }

    #[rstest::rstest]
    #[case(FetchRequest::get("https://api.example.com/data.json"))]
    #[case(FetchRequest::get(url("/api/lookup")).with_method("POST"))]
    #[tokio::test]
    async fn cross_origin_and_non_get_requests_pass_through(
        #[case] request: FetchRequest,
    ) -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let shim = fixture.shim("wame-cache-v1");
        shim.start().await?;
        fixture.go_offline();

        let outcome = shim.handle_fetch(&request).await?;

        assert_eq!(outcome, Interception::PassThrough);
        Ok(())
    }

    #[tokio::test]
    async fn version_bump_leaves_only_the_new_cache() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let old = fixture.shim("wame-cache-v1");
        old.start().await?;
        fixture.storage.open("some-other-cache").await?;

        let new = fixture.shim("wame-cache-v2");
        new.install().await?;
        assert_eq!(fixture.storage.keys().await?.len(), 3);
        new.activate().await?;

        assert_eq!(fixture.storage.keys().await?, vec![String::from("wame-cache-v2")]);
        fixture.go_offline();
        let outcome = new.handle_fetch(&FetchRequest::get(url("/"))).await?;
        assert_eq!(
            outcome.into_response().map(|r| r.body),
            Some(b"wame-cache-v2/".to_vec())
        );
        Ok(())
    }
}
