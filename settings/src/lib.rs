use std::time::Duration;

use enum_display::EnumDisplay;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Deserializer};

/// アプリケーション設定
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    /// HTTPサーバー設定
    pub http: HttpSettings,
    /// ログ設定
    pub log: LogSettings,
    /// Twilio設定
    pub twilio: TwilioSettings,
    /// 電話番号照会設定
    pub lookup: LookupSettings,
    /// オフラインキャッシュ設定
    pub offline: OfflineSettings,
    /// Redis設定
    pub redis: RedisSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, EnumDisplay)]
#[serde(rename = "protocol")]
#[serde(rename_all = "lowercase")]
#[enum_display(case = "Lower")]
pub enum HttpProtocol {
    /// HTTPプロトコル
    Http,
    /// HTTPSプロトコル
    Https,
}

/// HTTPサーバー設定
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// プロトコル
    pub protocol: HttpProtocol,
    /// ホスト名
    pub host: String,
    /// ポート番号
    pub port: u16,
}

/// ログ設定
#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// ログレベル（大文字と小文字を区別しない）
    #[serde(deserialize_with = "deserialize_log_level")]
    pub level: log::Level,
}

/// ログレベルを文字列から大文字と小文字を区別せずにデシリアライズする。
fn deserialize_log_level<'de, D>(deserializer: D) -> Result<log::Level, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value.trim().parse().map_err(serde::de::Error::custom)
}

/// Twilio設定
///
/// 認証情報は環境変数`TWILIO_ACCOUNT_SID`と`TWILIO_AUTH_TOKEN`から与えられることを想定している。
/// 認証情報が欠けていてもサーバーは起動し、照会リクエストごとにエラーを返す。
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioSettings {
    /// アカウントSID
    pub account_sid: Option<SecretString>,
    /// 認証トークン
    pub auth_token: Option<SecretString>,
    /// Lookups APIのベースURL
    pub base_url: String,
}

/// Twilio認証情報
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    /// アカウントSID
    pub account_sid: SecretString,
    /// 認証トークン
    pub auth_token: SecretString,
}

/// 電話番号照会設定
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LookupSettings {
    /// 電話番号1件あたりの照会タイムアウト（秒）
    pub timeout_seconds: u64,
}

/// オフラインキャッシュ設定
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineSettings {
    /// キャッシュ名（バージョンを含む）
    pub cache_name: String,
    /// インストール時に事前キャッシュするURL
    pub precache_urls: Vec<String>,
    /// ナビゲーションが失敗したときに返すドキュメント
    pub fallback_document: String,
    /// 静的アセットを配置したディレクトリ
    pub asset_dir: String,
}

/// Redis設定
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// ポート番号
    pub port: u16,
    /// ホスト
    pub host: String,
}

impl HttpSettings {
    /// バインドするアドレス（ホスト名とポート番号）を返す。
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// オリジン（プロトコル、ホスト名、ポート番号）を返す。
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl TwilioSettings {
    /// 認証情報を返す。
    ///
    /// アカウントSIDと認証トークンのどちらかが未設定、または空文字の場合は`None`を返す。
    pub fn credentials(&self) -> Option<TwilioCredentials> {
        let account_sid = non_empty_secret(self.account_sid.as_ref())?;
        let auth_token = non_empty_secret(self.auth_token.as_ref())?;
        Some(TwilioCredentials {
            account_sid,
            auth_token,
        })
    }
}

fn non_empty_secret(secret: Option<&SecretString>) -> Option<SecretString> {
    secret
        .map(|s| s.expose_secret().trim())
        .filter(|s| !s.is_empty())
        .map(|s| SecretString::new(s.into()))
}

/// HTTPクライアント全体のタイムアウトに、照会タイムアウトより加える時間
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

impl LookupSettings {
    /// 照会タイムアウトを返す。
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// HTTPクライアント全体のタイムアウトを返す。
    ///
    /// 照会タイムアウトが常に先に発生するように、照会タイムアウトより長くする。
    pub fn client_timeout(&self) -> Duration {
        self.timeout() + CLIENT_TIMEOUT_MARGIN
    }
}

impl RedisSettings {
    /// RedisURIを返す。
    pub fn uri(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}
