use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};

use domain::models::{LookupResult, PhoneNumbers};
use use_case::lookup::LookupUseCase;
use utils::serde::{deserialize_option_loose_strings, deserialize_option_string_only};

use crate::{
    AppState,
    http::{ApiError, ApiResult, method_not_allowed, missing_credentials},
    twilio::TwilioCarrierRepository,
};

/// 電話番号照会リクエストボディ
///
/// `numbers`が配列の場合は`numbers`を、そうでない場合は文字列の`number`を照会する。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupRequestBody {
    /// 照会する電話番号のリスト
    #[serde(default, deserialize_with = "deserialize_option_loose_strings")]
    pub numbers: Option<Vec<String>>,
    /// 照会する電話番号
    #[serde(default, deserialize_with = "deserialize_option_string_only")]
    pub number: Option<String>,
}

impl LookupRequestBody {
    /// リクエストボディを解析する。
    ///
    /// 解析できないボディは、照会する電話番号がないボディとして扱う。
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// 照会する電話番号の候補を返す。
    pub fn candidates(self) -> Vec<String> {
        match (self.numbers, self.number) {
            (Some(numbers), _) => numbers,
            (None, Some(number)) => vec![number],
            (None, None) => vec![],
        }
    }
}

/// 電話番号照会レスポンスボディ
#[derive(Debug, Clone, Serialize)]
pub struct LookupResponseBody {
    /// 電話番号ごとの照会結果
    pub results: Vec<LookupResult>,
}

/// 電話番号照会ハンドラ
///
/// 認証情報を確認してから、リクエストボディを検証する。
#[tracing::instrument(skip(app_state, body))]
pub async fn lookup(
    State(app_state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<LookupResponseBody>> {
    let settings = &app_state.app_settings;
    let credentials = settings.twilio.credentials().ok_or_else(|| {
        tracing::error!("Twilio credentials are not configured");
        missing_credentials()
    })?;

    let candidates = LookupRequestBody::parse(&body).candidates();
    let numbers = PhoneNumbers::new(candidates).map_err(ApiError::from)?;
    tracing::info!(count = numbers.len(), "Looking up numbers");

    let repo = TwilioCarrierRepository::new(
        app_state.http_client.clone(),
        &settings.twilio.base_url,
        credentials,
    );
    let use_case = LookupUseCase::new(repo, settings.lookup.timeout());
    let results = use_case.lookup(numbers).await.map_err(ApiError::from)?;
    Ok(Json(LookupResponseBody { results }))
}

/// POST以外のメソッドのハンドラ
pub async fn lookup_method_not_allowed() -> ApiError {
    method_not_allowed().into()
}
