use anyhow::Context as _;

use infra::AppState;

use app::{
    bind_address, create_http_client, get_subscriber, init_subscriber, load_app_settings,
    routes::create_router,
};

/// アプリケーションエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // アプリケーション設定を読み込み
    let app_settings = load_app_settings("app_settings.toml")?;

    // トレーシングを初期化
    let subscriber = get_subscriber(
        env!("CARGO_PKG_NAME").into(),
        app_settings.log.level,
        std::io::stdout,
    );
    init_subscriber(subscriber)?;
    if app_settings.twilio.credentials().is_none() {
        tracing::warn!("Twilio credentials are not configured, lookups will be rejected");
    }

    // ルーターを作成
    let http_client = create_http_client(&app_settings.lookup)?;
    let (listener, port) = bind_address(&app_settings.http).await?;
    let app_state = AppState {
        app_settings: app_settings.clone(),
        http_client,
    };
    let router = create_router(app_state);

    // HTTPサーバーを起動
    tracing::info!(
        "HTTP server is running on {}:{}",
        app_settings.http.host,
        port
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start the HTTP server")?;
    tracing::info!("HTTP server has gracefully shutdown");

    Ok(())
}

/// Ctrl+Cを受け取るまで待機する。
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for the shutdown signal: {}", e);
    }
}
