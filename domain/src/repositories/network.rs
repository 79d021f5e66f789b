use async_trait::async_trait;

use crate::{
    DomainResult,
    models::{AssetResponse, FetchRequest},
};

/// ネットワーク
#[async_trait]
pub trait Network: Sync + Send {
    /// リクエストをネットワークに送信する。
    ///
    /// レスポンスを受け取れなかった場合だけエラーを返す。
    /// 4xxや5xxのステータスコードのレスポンスはエラーではない。
    async fn fetch(&self, request: &FetchRequest) -> DomainResult<AssetResponse>;
}
