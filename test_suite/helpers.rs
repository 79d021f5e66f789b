//! This module sets up the application and its fake upstream for integration tests
//!
//! The application runs on its own thread and runtime, like the real server.
//! The Twilio Lookups API is replaced by a fake server bound to a random port,
//! so lookups never leave the machine and no real credentials are needed.
//!
//! Set `TEST_LOG=1` to print the application's logs while running the tests.
use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path as UrlPath, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse as _, Response},
    routing::get,
};
use once_cell::sync::Lazy;
use secrecy::SecretString;
use serde_json::json;
use tokio::{net::TcpListener, sync::oneshot};

use app::{bind_address, get_subscriber, init_subscriber, load_app_settings, routes::create_router};
use infra::AppState;
use settings::AppSettings;

pub const TEST_ACCOUNT_SID: &str = "AC00000000000000000000000000000000";
pub const TEST_AUTH_TOKEN: &str = "test-auth-token";

/// A mobile number known to the fake upstream
pub const MOBILE_NUMBER: &str = "+15551234567";
/// A landline number reported through the legacy carrier object
pub const LANDLINE_NUMBER: &str = "+442071234567";
/// A number the fake upstream knows nothing about
pub const BARE_NUMBER: &str = "+15550000000";
/// A number the fake upstream answers too slowly
pub const SLOW_NUMBER: &str = "+15559999999";
/// A number the fake upstream rejects
pub const UNKNOWN_NUMBER: &str = "+19999999999";
pub const NOT_FOUND_MESSAGE: &str = "The requested resource was not found";

static TRACING: Lazy<()> = Lazy::new(|| {
    let name = String::from("test");
    let level = log::Level::Info;
    let result = if std::env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(name, level, std::io::stdout))
    } else {
        init_subscriber(get_subscriber(name, level, std::io::sink))
    };
    result.unwrap();
});

pub fn enable_tracing() {
    Lazy::force(&TRACING);
}

pub fn load_app_settings_for_testing() -> AppSettings {
    let dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = Path::new(&dir).join("..");
    let path = root.join("app_settings.toml");
    let mut app_settings = load_app_settings(path.as_os_str().to_str().unwrap()).unwrap();
    app_settings.offline.asset_dir = root.join("public").to_str().unwrap().to_string();
    app_settings.twilio.account_sid = Some(SecretString::new(TEST_ACCOUNT_SID.into()));
    app_settings.twilio.auth_token = Some(SecretString::new(TEST_AUTH_TOKEN.into()));
    app_settings.lookup.timeout_seconds = 1;
    app_settings
}

pub struct TestApp {
    pub app_settings: AppSettings,
    pub listener: TcpListener,
}

pub async fn configure_test_app(mut app_settings: AppSettings) -> TestApp {
    // Specify a random port for the HTTP server to bind
    app_settings.http.host = String::from("127.0.0.1");
    app_settings.http.port = 0;
    let (listener, port) = bind_address(&app_settings.http).await.unwrap();
    app_settings.http.port = port;

    TestApp {
        app_settings,
        listener,
    }
}

/// Spawns the application server in a separate thread
///
/// Returns a tuple containing the thread handle and a sender to signal for graceful shutdown.
pub async fn spawn_app(
    app_state: AppState,
    listener: TcpListener,
) -> (JoinHandle<()>, oneshot::Sender<()>) {
    let (close_tx, close_rx) = oneshot::channel();

    let listener = listener.into_std().unwrap();
    let handle = std::thread::spawn(|| run_server(app_state, listener, close_rx));
    (handle, close_tx)
}

/// Runs the application server with graceful shutdown support
fn run_server(
    app_state: AppState,
    listener: std::net::TcpListener,
    close_rx: oneshot::Receiver<()>,
) {
    let router = create_router(app_state);
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async move {
        let listener = TcpListener::from_std(listener).unwrap();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                _ = close_rx.await;
            })
            .await
            .unwrap();
    });
}

/// Requests received by the fake Lookups API
#[derive(Debug, Default)]
pub struct UpstreamRecorder {
    hits: AtomicUsize,
    authorizations: Mutex<Vec<String>>,
}

impl UpstreamRecorder {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.authorizations.lock().unwrap().clone()
    }
}

/// Fake Twilio Lookups API running on the test's runtime
pub struct FakeLookups {
    pub base_url: String,
    pub recorder: Arc<UpstreamRecorder>,
}

impl FakeLookups {
    pub async fn start() -> Self {
        let recorder = Arc::new(UpstreamRecorder::default());
        let router = Router::new()
            .route("/v2/PhoneNumbers/{number}", get(phone_number))
            .with_state(recorder.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", address),
            recorder,
        }
    }
}

async fn phone_number(
    State(recorder): State<Arc<UpstreamRecorder>>,
    UrlPath(number): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    recorder.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        recorder
            .authorizations
            .lock()
            .unwrap()
            .push(value.to_string());
    }

    match number.as_str() {
        MOBILE_NUMBER => Json(json!({
            "phone_number": MOBILE_NUMBER,
            "country_code": "US",
            "valid": true,
            "line_type_intelligence": {
                "type": "mobile",
                "carrier_name": "Verizon Wireless",
                "mobile_country_code": "311",
                "mobile_network_code": "480"
            },
            "carrier": null
        }))
        .into_response(),
        LANDLINE_NUMBER => Json(json!({
            "phone_number": LANDLINE_NUMBER,
            "country_code": "GB",
            "valid": false,
            "carrier": { "type": "landline", "name": "BT" }
        }))
        .into_response(),
        BARE_NUMBER => Json(json!({ "phone_number": BARE_NUMBER })).into_response(),
        SLOW_NUMBER => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "phone_number": SLOW_NUMBER })).into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "code": 20404,
                "message": NOT_FOUND_MESSAGE,
                "more_info": "https://www.twilio.com/docs/errors/20404",
                "status": 404
            })),
        )
            .into_response(),
    }
}
