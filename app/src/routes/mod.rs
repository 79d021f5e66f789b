use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use infra::{
    AppState,
    http::handler::{
        health_check,
        lookup::{lookup, lookup_method_not_allowed},
    },
};

/// ルーターを作成する。
///
/// APIにマッチしないパスは、静的アセットディレクトリから配信する。
///
/// # 引数
///
/// * `app_state`: アプリケーション状態
pub fn create_router(app_state: AppState) -> Router {
    let assets = ServeDir::new(&app_state.app_settings.offline.asset_dir);
    Router::new()
        .route("/health-check", get(health_check))
        .route("/lookup", post(lookup).fallback(lookup_method_not_allowed))
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::{
        Json,
        body::Body,
        extract::{Path, State},
        http::{Request, StatusCode},
        response::{IntoResponse as _, Response},
    };
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt as _;

    use settings::{
        AppSettings, HttpProtocol, HttpSettings, LogSettings, LookupSettings, OfflineSettings,
        RedisSettings, TwilioSettings,
    };

    use super::*;

    /// Twilio Lookups APIの代わりに応答するサーバーを起動して、ベースURLを返す。
    async fn spawn_fake_lookups(hits: Arc<AtomicUsize>) -> String {
        let router = Router::new()
            .route("/v2/PhoneNumbers/{number}", get(phone_number))
            .with_state(hits);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", address)
    }

    async fn phone_number(
        State(hits): State<Arc<AtomicUsize>>,
        Path(number): Path<String>,
    ) -> Response {
        hits.fetch_add(1, Ordering::SeqCst);
        match number.as_str() {
            "+15551234567" => Json(json!({
                "phone_number": "+15551234567",
                "country_code": "US",
                "valid": true,
                "line_type_intelligence": {
                    "type": "mobile",
                    "carrier_name": "Verizon Wireless"
                }
            }))
            .into_response(),
            "+15550000000" => Json(json!({
                "phone_number": "+15550000000",
                "country_code": "US",
                "valid": true,
                "line_type_intelligence": null
            }))
            .into_response(),
            _ => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "code": 20404,
                    "message": "The requested resource was not found",
                    "status": 404
                })),
            )
                .into_response(),
        }
    }

    fn app_settings(base_url: &str, credentials: Option<(&str, &str)>) -> AppSettings {
        AppSettings {
            http: HttpSettings {
                protocol: HttpProtocol::Http,
                host: String::from("127.0.0.1"),
                port: 8000,
            },
            log: LogSettings {
                level: log::Level::Info,
            },
            twilio: TwilioSettings {
                account_sid: credentials.map(|(sid, _)| SecretString::new(sid.into())),
                auth_token: credentials.map(|(_, token)| SecretString::new(token.into())),
                base_url: base_url.to_string(),
            },
            lookup: LookupSettings { timeout_seconds: 5 },
            offline: OfflineSettings {
                cache_name: String::from("wame-cache-v1"),
                precache_urls: vec![String::from("/")],
                fallback_document: String::from("/index.html"),
                asset_dir: format!("{}/../public", env!("CARGO_MANIFEST_DIR")),
            },
            redis: RedisSettings {
                port: 6379,
                host: String::from("127.0.0.1"),
            },
        }
    }

    fn router(base_url: &str, credentials: Option<(&str, &str)>) -> Router {
        create_router(AppState {
            app_settings: app_settings(base_url, credentials),
            http_client: reqwest::Client::new(),
        })
    }

    fn post_lookup(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/lookup")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const CREDENTIALS: Option<(&str, &str)> = Some(("AC123", "secret"));

    #[tokio::test]
    async fn health_check_responds() {
        let response = router("http://127.0.0.1:9", None)
            .oneshot(
                Request::builder()
                    .uri("/health-check")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[rstest::rstest]
    #[case("GET")]
    #[case("PUT")]
    #[case("DELETE")]
    #[tokio::test]
    async fn only_post_is_allowed_on_lookup(#[case] method: &str) {
        let response = router("http://127.0.0.1:9", None)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/lookup")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Method Not Allowed" })
        );
    }

    #[tokio::test]
    async fn missing_credentials_are_reported_without_calling_upstream() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_fake_lookups(hits.clone()).await;

        let response = router(&base_url, Some(("AC123", "")))
            .oneshot(post_lookup(r#"{"numbers": ["+15551234567"]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({
                "error": "Twilio credentials not configured on server",
                "code": "MISSING_CREDENTIALS"
            })
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[rstest::rstest]
    #[case(r#"{}"#)]
    #[case(r#"{"numbers": []}"#)]
    #[case(r#"{"numbers": ["", ""]}"#)]
    #[case(r#"{"number": ""}"#)]
    #[case(r#"{"number": 15551234567}"#)]
    #[case("not json")]
    #[case("")]
    #[tokio::test]
    async fn requests_without_numbers_are_rejected(#[case] body: &str) {
        let hits = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_fake_lookups(hits.clone()).await;

        let response = router(&base_url, CREDENTIALS)
            .oneshot(post_lookup(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "No numbers provided" })
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn results_follow_request_order_with_inline_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_fake_lookups(hits.clone()).await;

        let response = router(&base_url, CREDENTIALS)
            .oneshot(post_lookup(
                r#"{"numbers": ["+15551234567", "", "+19999999999", "+15550000000"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({
                "results": [
                    {
                        "number": "+15551234567",
                        "type": "mobile",
                        "carrier": "Verizon Wireless",
                        "country": "US",
                        "valid": true
                    },
                    {
                        "number": "+19999999999",
                        "error": "The requested resource was not found"
                    },
                    {
                        "number": "+15550000000",
                        "type": "unknown",
                        "carrier": "Unknown",
                        "country": "US",
                        "valid": true
                    }
                ]
            })
        );
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_number_field_is_accepted() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_fake_lookups(hits.clone()).await;

        let response = router(&base_url, CREDENTIALS)
            .oneshot(post_lookup(r#"{"number": "+15551234567"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["results"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["results"][0]["type"], "mobile");
    }

    #[tokio::test]
    async fn static_assets_are_served() {
        let response = router("http://127.0.0.1:9", None)
            .oneshot(
                Request::builder()
                    .uri("/manifest.webmanifest")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
