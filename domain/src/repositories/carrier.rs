use async_trait::async_trait;

use crate::{
    DomainResult,
    models::{CarrierRecord, PhoneNumber},
};

/// キャリア照会リポジトリ
///
/// 電話番号の回線種別やキャリアを外部サービスに照会する。
#[async_trait]
pub trait CarrierRepository: Sync + Send {
    /// 電話番号1件を照会する。
    ///
    /// # 引数
    ///
    /// * `number` - 電話番号
    ///
    /// # 戻り値
    ///
    /// 照会サービスが返した電話番号の情報
    async fn fetch(&self, number: &PhoneNumber) -> DomainResult<CarrierRecord>;
}
