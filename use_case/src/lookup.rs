use std::{sync::Arc, time::Duration};

use futures::future::join_all;

use domain::{
    DomainError, DomainErrorKind, DomainResult,
    models::{LookupResult, PhoneNumber, PhoneNumbers},
    repositories::CarrierRepository,
};

/// 照会がタイムアウトしたときのメッセージ
pub const LOOKUP_TIMED_OUT_MESSAGE: &str = "Lookup timed out";
/// バッチ全体を照会できなかったときのメッセージ
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Unable to look up numbers right now, please try again later.";

/// 電話番号照会ユースケース
pub struct LookupUseCase<R>
where
    R: CarrierRepository,
{
    /// キャリア照会リポジトリ
    repo: Arc<R>,
    /// 電話番号1件あたりのタイムアウト
    timeout: Duration,
}

impl<R> LookupUseCase<R>
where
    R: CarrierRepository + 'static,
{
    /// 電話番号照会ユースケースを作成する。
    pub fn new(repo: R, timeout: Duration) -> Self {
        Self {
            repo: Arc::new(repo),
            timeout,
        }
    }

    /// 電話番号をまとめて照会する。
    ///
    /// 電話番号ごとに独立したタスクで並行して照会して、すべてのタスクが終わるまで待機する。
    /// ある電話番号の照会の失敗は、その電話番号の照会結果に記録され、他の電話番号の照会に影響しない。
    /// 照会結果は入力した電話番号の順番で返す。
    ///
    /// # 戻り値
    ///
    /// 電話番号ごとの照会結果
    ///
    /// タスクが完了しなかった場合は、バッチ全体の失敗として`Unavailable`エラーを返す。
    pub async fn lookup(&self, numbers: PhoneNumbers) -> DomainResult<Vec<LookupResult>> {
        let tasks = numbers.into_iter().map(|number| {
            let repo = Arc::clone(&self.repo);
            let timeout = self.timeout;
            tokio::spawn(async move { lookup_one(repo.as_ref(), number, timeout).await })
        });
        join_all(tasks)
            .await
            .into_iter()
            .map(|settled| {
                settled.map_err(|e| {
                    tracing::error!(error = %e, "A lookup task did not complete");
                    DomainError {
                        kind: DomainErrorKind::Unavailable,
                        messages: vec![SERVICE_UNAVAILABLE_MESSAGE.into()],
                        source: e.into(),
                    }
                })
            })
            .collect()
    }
}

/// 電話番号1件を照会して、失敗を照会結果に変換する。
async fn lookup_one<R>(repo: &R, number: PhoneNumber, timeout: Duration) -> LookupResult
where
    R: CarrierRepository + ?Sized,
{
    match tokio::time::timeout(timeout, repo.fetch(&number)).await {
        Ok(Ok(record)) => LookupResult::found(number, &record),
        Ok(Err(e)) => {
            tracing::warn!(number = %number, error = %e, "Failed to look up the number");
            LookupResult::failed(number, e.to_string())
        }
        Err(_) => {
            tracing::warn!(number = %number, timeout = ?timeout, "The lookup timed out");
            LookupResult::failed(number, LOOKUP_TIMED_OUT_MESSAGE)
        }
    }
}
