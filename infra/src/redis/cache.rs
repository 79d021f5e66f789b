use deadpool_redis::{Connection as RedisConnection, Pool as RedisPool};
use redis::AsyncCommands as _;
use time::OffsetDateTime;

use domain::{
    DomainError, DomainErrorKind, DomainResult, models::AssetResponse,
    repositories::CacheStorage,
};

/// キャッシュ名を作成日時をスコアにして登録するソート済みセットのキー
const CACHE_NAMES_KEY: &str = "offline:caches";

/// Redisキャッシュストレージ
///
/// キャッシュ名はソート済みセットで、キャッシュはURLをフィールドにしたハッシュで管理する。
pub struct RedisCacheStorage {
    /// Redis接続プール
    pool: RedisPool,
}

impl RedisCacheStorage {
    /// Redisキャッシュストレージを構築する。
    ///
    /// # 引数
    ///
    /// * `pool` - Redis接続プール
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Redisに接続する。
    async fn connection(&self) -> DomainResult<RedisConnection> {
        self.pool.get().await.map_err(|e| DomainError {
            kind: DomainErrorKind::Cache,
            messages: vec!["Failed to connect to the redis".into()],
            source: e.into(),
        })
    }

    /// キャッシュ名を作成日時とともに登録するパイプラインを返す。
    ///
    /// 登録済みのキャッシュ名の作成日時は更新しない。
    fn register_cache_name(cache_name: &str) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("ZADD")
            .arg(CACHE_NAMES_KEY)
            .arg("NX")
            .arg(creation_score())
            .arg(cache_name)
            .ignore();
        pipe
    }

    async fn cache_names(&self, conn: &mut RedisConnection) -> DomainResult<Vec<String>> {
        conn.zrange(CACHE_NAMES_KEY, 0, -1)
            .await
            .map_err(|e| cache_error("Failed to retrieve cache names from redis", e))
    }
}

#[async_trait::async_trait]
impl CacheStorage for RedisCacheStorage {
    async fn open(&self, cache_name: &str) -> DomainResult<()> {
        let mut conn = self.connection().await?;
        Self::register_cache_name(cache_name)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| cache_error("Failed to register a cache name in redis", e))
    }

    async fn keys(&self) -> DomainResult<Vec<String>> {
        let mut conn = self.connection().await?;
        self.cache_names(&mut conn).await
    }

    async fn delete(&self, cache_name: &str) -> DomainResult<bool> {
        let mut conn = self.connection().await?;
        let (removed, _): (i64, i64) = redis::pipe()
            .atomic()
            .zrem(CACHE_NAMES_KEY, cache_name)
            .del(cache_key(cache_name))
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error("Failed to delete a cache from redis", e))?;
        Ok(removed > 0)
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
        let fields = entries
            .iter()
            .map(|(url, response)| Ok((url.as_str(), encode(response)?)))
            .collect::<DomainResult<Vec<_>>>()?;
        let mut pipe = Self::register_cache_name(cache_name);
        if !fields.is_empty() {
            pipe.hset_multiple(cache_key(cache_name), &fields).ignore();
        }
        let mut conn = self.connection().await?;
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| cache_error("Failed to store responses in redis", e))
    }

    async fn get(&self, cache_name: &str, url: &str) -> DomainResult<Option<AssetResponse>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .hget(cache_key(cache_name), url)
            .await
            .map_err(|e| cache_error("Failed to retrieve a response from redis", e))?;
        value.as_deref().map(decode).transpose()
    }

    async fn match_any(&self, url: &str) -> DomainResult<Option<AssetResponse>> {
        let mut conn = self.connection().await?;
        for cache_name in self.cache_names(&mut conn).await? {
            let value: Option<String> = conn
                .hget(cache_key(&cache_name), url)
                .await
                .map_err(|e| cache_error("Failed to retrieve a response from redis", e))?;
            if let Some(value) = value {
                return decode(&value).map(Some);
            }
        }
        Ok(None)
    }
}

/// キャッシュを保存するハッシュのキーを生成する。
fn cache_key(cache_name: &str) -> String {
    format!("offline:cache:{}", cache_name)
}

/// キャッシュ名を登録するときのスコア（マイクロ秒単位のUNIX時間）
fn creation_score() -> f64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as f64
}

fn encode(response: &AssetResponse) -> DomainResult<String> {
    serde_json::to_string(response).map_err(|e| DomainError {
        kind: DomainErrorKind::Cache,
        messages: vec!["Failed to serialize a response".into()],
        source: e.into(),
    })
}

fn decode(value: &str) -> DomainResult<AssetResponse> {
    serde_json::from_str(value).map_err(|e| DomainError {
        kind: DomainErrorKind::Cache,
        messages: vec!["The cached response in redis is broken".into()],
        source: e.into(),
    })
}

fn cache_error(message: &'static str, e: redis::RedisError) -> DomainError {
    DomainError {
        kind: DomainErrorKind::Cache,
        messages: vec![message.into()],
        source: e.into(),
    }
}
