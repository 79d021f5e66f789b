pub mod routes;

use anyhow::Context as _;
use config::Config;
use deadpool_redis::Config as RedisConfig;
use tokio::net::TcpListener;
use tracing::{Subscriber, subscriber::set_global_default};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt::MakeWriter, layer::SubscriberExt as _};

use domain::models::{DEFAULT_CACHE_NAME, DEFAULT_FALLBACK_DOCUMENT, DEFAULT_PRECACHE_URLS};
use settings::{AppSettings, HttpSettings, LookupSettings, RedisSettings};

/// TwilioのアカウントSIDを設定する環境変数
pub const TWILIO_ACCOUNT_SID_ENV: &str = "TWILIO_ACCOUNT_SID";
/// Twilioの認証トークンを設定する環境変数
pub const TWILIO_AUTH_TOKEN_ENV: &str = "TWILIO_AUTH_TOKEN";

/// アプリケーション設定を読み込む。
///
/// 既定値、設定ファイル、`APP_`で始まる環境変数の順に上書きする。
/// 設定ファイルが存在しない場合は無視する。
/// Twilioの認証情報は、環境変数`TWILIO_ACCOUNT_SID`と`TWILIO_AUTH_TOKEN`から読み込む。
pub fn load_app_settings(path: &str) -> anyhow::Result<AppSettings> {
    let precache_urls = DEFAULT_PRECACHE_URLS
        .iter()
        .map(|url| url.to_string())
        .collect::<Vec<_>>();
    let config = Config::builder()
        .set_default("http.protocol", "http")?
        .set_default("http.host", "127.0.0.1")?
        .set_default("http.port", 8000)?
        .set_default("log.level", "info")?
        .set_default("twilio.base_url", "https://lookups.twilio.com")?
        .set_default("lookup.timeout_seconds", 10)?
        .set_default("offline.cache_name", DEFAULT_CACHE_NAME)?
        .set_default("offline.precache_urls", precache_urls)?
        .set_default("offline.fallback_document", DEFAULT_FALLBACK_DOCUMENT)?
        .set_default("offline.asset_dir", "public")?
        .set_default("redis.host", "127.0.0.1")?
        .set_default("redis.port", 6379)?
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("twilio.account_sid", std::env::var(TWILIO_ACCOUNT_SID_ENV).ok())?
        .set_override_option("twilio.auth_token", std::env::var(TWILIO_AUTH_TOKEN_ENV).ok())?
        .build()
        .context("Failed to read the app_settings.toml file")?;
    config
        .try_deserialize()
        .context("The contents of the app_settings.toml file is incorrect")
}

pub async fn bind_address(settings: &HttpSettings) -> anyhow::Result<(TcpListener, u16)> {
    let listener = TcpListener::bind(settings.bind_address())
        .await
        .context("Failed to bind to the address for the HTTP server")?;
    let port = listener
        .local_addr()
        .context("Failed to get the port of listener")?
        .port();

    Ok((listener, port))
}

/// 外部サービスに接続するHTTPクライアントを作成する。
///
/// クライアント全体のタイムアウトは照会ごとのタイムアウトより長くする。
pub fn create_http_client(settings: &LookupSettings) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.client_timeout())
        .build()
        .context("Failed to create the HTTP client")
}

pub fn create_redis_pool(settings: &RedisSettings) -> anyhow::Result<deadpool_redis::Pool> {
    let config = RedisConfig {
        url: Some(settings.uri()),
        connection: None,
        pool: None,
    };
    config
        .create_pool(None)
        .context("Failed to create Redis connection pool")
}

pub fn get_subscriber<Sink>(
    name: String,
    log_level: log::Level,
    sink: Sink,
) -> impl Subscriber + Sync + Send
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let formatting_layer = BunyanFormattingLayer::new(name, sink);
    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

pub fn init_subscriber(subscriber: impl Subscriber + Sync + Send) -> anyhow::Result<()> {
    LogTracer::init().context("Failed to set logger")?;
    set_global_default(subscriber).context("Failed to set subscriber")
}
