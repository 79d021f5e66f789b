use reqwest::{Client, Url};
use secrecy::ExposeSecret as _;
use serde::Deserialize;
use serde_json::Value;

use domain::{
    DomainError, DomainErrorKind, DomainResult,
    models::{CarrierRecord, LOOKUP_FAILED_MESSAGE, PhoneNumber},
    repositories::CarrierRepository,
};
use settings::TwilioCredentials;

/// Lookups APIに要求する情報
const LOOKUP_FIELDS: &str = "line_type_intelligence,carrier";

/// Twilio Lookups v2を使用するキャリア照会リポジトリ
pub struct TwilioCarrierRepository {
    /// HTTPクライアント
    client: Client,
    /// Lookups APIのベースURL
    base_url: String,
    /// 認証情報
    credentials: TwilioCredentials,
}

impl TwilioCarrierRepository {
    /// Twilioキャリア照会リポジトリを構築する。
    ///
    /// # 引数
    ///
    /// * `client` - HTTPクライアント
    /// * `base_url` - Lookups APIのベースURL
    /// * `credentials` - 認証情報
    pub fn new(client: Client, base_url: &str, credentials: TwilioCredentials) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// 電話番号を照会するURLを生成する。
    ///
    /// 電話番号はパスセグメントとしてエンコードする。
    fn endpoint(&self, number: &PhoneNumber) -> DomainResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| DomainError {
            kind: DomainErrorKind::Lookup,
            messages: vec![format!("The Lookups base URL is invalid: {}", e).into()],
            source: e.into(),
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                DomainError::new(
                    DomainErrorKind::Lookup,
                    "The Lookups base URL cannot have a path",
                )
            })?
            .pop_if_empty()
            .extend(["v2", "PhoneNumbers", number.0.as_str()]);
        url.query_pairs_mut().append_pair("Fields", LOOKUP_FIELDS);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl CarrierRepository for TwilioCarrierRepository {
    /// 電話番号1件を照会する。
    ///
    /// 2xx以外のステータスコードの場合は、Twilioが返したエラーメッセージで照会失敗のエラーを返す。
    #[tracing::instrument(skip_all, fields(number = %number))]
    async fn fetch(&self, number: &PhoneNumber) -> DomainResult<CarrierRecord> {
        let url = self.endpoint(number)?;
        let response = self
            .client
            .get(url)
            .basic_auth(
                self.credentials.account_sid.expose_secret(),
                Some(self.credentials.auth_token.expose_secret()),
            )
            .send()
            .await
            .map_err(lookup_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(lookup_error)?;
        if !status.is_success() {
            let message = serde_json::from_slice::<TwilioErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| LOOKUP_FAILED_MESSAGE.to_string());
            tracing::debug!(status = %status, message = %message, "The Lookups API returned an error");
            return Err(DomainError::new(DomainErrorKind::Lookup, message));
        }
        let resource =
            serde_json::from_slice::<PhoneNumberResource>(&body).map_err(|e| DomainError {
                kind: DomainErrorKind::Lookup,
                messages: vec![format!("Unexpected response from the Lookups API: {}", e).into()],
                source: e.into(),
            })?;
        Ok(resource.into())
    }
}

fn lookup_error(e: reqwest::Error) -> DomainError {
    DomainError {
        kind: DomainErrorKind::Lookup,
        messages: vec![e.to_string().into()],
        source: e.into(),
    }
}

/// Lookups v2の電話番号リソース
#[derive(Debug, Clone, Default, Deserialize)]
struct PhoneNumberResource {
    /// ISO国コード
    country_code: Option<String>,
    /// 有効フラグ（真偽値以外は無視する）
    valid: Option<Value>,
    /// 回線種別インテリジェンス
    line_type_intelligence: Option<LineTypeIntelligence>,
    /// キャリア情報（オブジェクトまたはキャリア名の文字列）
    carrier: Option<Value>,
}

/// 回線種別インテリジェンス
#[derive(Debug, Clone, Default, Deserialize)]
struct LineTypeIntelligence {
    #[serde(rename = "type")]
    line_type: Option<String>,
    carrier_name: Option<String>,
}

/// Twilioのエラーレスポンスボディ
#[derive(Debug, Clone, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
}

impl From<PhoneNumberResource> for CarrierRecord {
    fn from(resource: PhoneNumberResource) -> Self {
        let (carrier_type, carrier_name) = match resource.carrier {
            Some(Value::Object(carrier)) => (
                carrier.get("type").and_then(Value::as_str).map(String::from),
                carrier.get("name").and_then(Value::as_str).map(String::from),
            ),
            Some(Value::String(name)) => (None, Some(name)),
            _ => (None, None),
        };
        let (line_type, line_type_carrier_name) = match resource.line_type_intelligence {
            Some(lti) => (lti.line_type, lti.carrier_name),
            None => (None, None),
        };
        Self {
            line_type,
            carrier_type,
            carrier_name,
            line_type_carrier_name,
            country_code: resource.country_code,
            valid: resource.valid.as_ref().and_then(Value::as_bool),
        }
    }
}
