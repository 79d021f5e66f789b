use enum_display::EnumDisplay;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// 既定のキャッシュ名
///
/// キャッシュするアセットを変更したときは、バージョンを上げること。
pub const DEFAULT_CACHE_NAME: &str = "wame-cache-v1";

/// 既定の事前キャッシュするURL
pub const DEFAULT_PRECACHE_URLS: [&str; 5] = [
    "/",
    "/index.html",
    "/manifest.webmanifest",
    "/icons/icon-192.svg",
    "/icons/icon-512.svg",
];

/// 既定のナビゲーションのフォールバックドキュメント
pub const DEFAULT_FALLBACK_DOCUMENT: &str = "/index.html";

/// リクエストのモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumDisplay)]
#[enum_display(case = "Kebab")]
pub enum RequestMode {
    /// ページの読み込み
    Navigate,
    /// 同一オリジンのみ
    SameOrigin,
    /// CORS
    Cors,
    /// CORSなし
    NoCors,
}

/// オフラインキャッシュが受け取るリクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// 絶対URL
    pub url: String,
    /// HTTPメソッド（大文字）
    pub method: String,
    /// リクエストモード
    pub mode: RequestMode,
}

impl FetchRequest {
    /// GETリクエストを構築する。
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: String::from("GET"),
            mode: RequestMode::Cors,
        }
    }

    /// ナビゲーションリクエストを構築する。
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// メソッドを指定したリクエストを構築する。
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// ネットワークまたはキャッシュから得たレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetResponse {
    /// HTTPステータスコード
    pub status: u16,
    /// ヘッダ
    pub headers: Vec<(String, String)>,
    /// ボディ
    pub body: Vec<u8>,
    /// レスポンスを受け取った日時
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

impl AssetResponse {
    /// レスポンスを構築する。
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            received_at: OffsetDateTime::now_utc(),
        }
    }

    /// ステータスコードが2xxであるか確認する。
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 名前でヘッダの値を取得する。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// オフラインキャッシュの設定
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// キャッシュ名（バージョンを含む）
    pub cache_name: String,
    /// 事前キャッシュするURL
    pub precache_urls: Vec<String>,
    /// ナビゲーションのフォールバックドキュメント
    pub fallback_document: String,
    /// アプリケーションのオリジン
    pub origin: String,
}

impl OfflineConfig {
    /// 既定のキャッシュ名とマニフェストで設定を構築する。
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            precache_urls: DEFAULT_PRECACHE_URLS.iter().map(|s| s.to_string()).collect(),
            fallback_document: DEFAULT_FALLBACK_DOCUMENT.to_string(),
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    /// URLをオリジンに対して解決する。
    ///
    /// 絶対URLはそのまま返す。
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        if url.starts_with('/') {
            format!("{}{}", self.origin, url)
        } else {
            format!("{}/{}", self.origin, url)
        }
    }

    /// URLがアプリケーションと同一オリジンであるか確認する。
    pub fn is_same_origin(&self, url: &str) -> bool {
        url.strip_prefix(&self.origin)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
    }

    /// 事前キャッシュするURLを絶対URLで返す。
    pub fn precache_requests(&self) -> Vec<FetchRequest> {
        self.precache_urls
            .iter()
            .map(|url| FetchRequest::get(self.resolve(url)))
            .collect()
    }
}

/// オフラインキャッシュのライフサイクルの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumDisplay)]
#[enum_display(case = "Lower")]
pub enum ShimState {
    /// 事前キャッシュ中
    Installing,
    /// 古い世代のキャッシュを削除して、クライアントを制御する準備をしている
    Activating,
    /// リクエストを横取りしている
    Active,
}

/// リクエストの処理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// 横取りしない
    PassThrough,
    /// ネットワークから得たレスポンス
    Network(AssetResponse),
    /// キャッシュから得たレスポンス
    Cache(AssetResponse),
}

impl Interception {
    /// 横取りした場合はレスポンスを返す。
    pub fn into_response(self) -> Option<AssetResponse> {
        match self {
            Self::PassThrough => None,
            Self::Network(response) | Self::Cache(response) => Some(response),
        }
    }
}
