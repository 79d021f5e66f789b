use async_trait::async_trait;

use crate::{DomainResult, models::AssetResponse};

/// キャッシュストレージ
///
/// 名前付きのキャッシュを管理する。キャッシュはURLをキーにレスポンスを保存する。
/// キャッシュ名の列挙と、全キャッシュを対象にした検索は、キャッシュを作成した順に行う。
#[async_trait]
pub trait CacheStorage: Sync + Send {
    /// キャッシュを開く。
    ///
    /// キャッシュが存在しない場合は作成する。
    async fn open(&self, cache_name: &str) -> DomainResult<()>;

    /// キャッシュ名を作成した順に返す。
    async fn keys(&self) -> DomainResult<Vec<String>>;

    /// キャッシュを削除する。
    ///
    /// # 戻り値
    ///
    /// キャッシュが存在した場合は`true`
    async fn delete(&self, cache_name: &str) -> DomainResult<bool>;

    /// レスポンスをキャッシュに保存する。
    ///
    /// 同じURLのレスポンスが存在する場合は上書きする。
    async fn put(&self, cache_name: &str, url: &str, response: AssetResponse) -> DomainResult<()>;

    /// 複数のレスポンスをまとめてキャッシュに保存する。
    ///
    /// すべて保存されるか、1つも保存されないかのどちらかである。
    async fn put_all(
        &self,
        cache_name: &str,
        entries: Vec<(String, AssetResponse)>,
    ) -> DomainResult<()>;

    /// キャッシュからURLのレスポンスを取得する。
    async fn get(&self, cache_name: &str, url: &str) -> DomainResult<Option<AssetResponse>>;

    /// すべてのキャッシュからURLのレスポンスを検索する。
    async fn match_any(&self, url: &str) -> DomainResult<Option<AssetResponse>>;
}
