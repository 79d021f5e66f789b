use std::{sync::Arc, thread::JoinHandle, time::Duration};

use serde_json::Value;
use settings::AppSettings;
use tokio::sync::oneshot;

use infra::{
    AppState,
    offline::{HttpNetwork, MemoryCacheStorage, offline_config},
};
use use_case::offline::OfflineCache;

use app::create_http_client;

use crate::helpers::{FakeLookups, TestApp, configure_test_app, enable_tracing, spawn_app};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableTracing {
    Yes,
    No,
}

/// Test case for integration tests
///
/// ```
/// #[tokio::test]
/// async fn integration_test_case_skeleton() {
///     let app_settings = load_app_settings_for_testing();
///     let test_case = TestCase::begin(app_settings, EnableTracing::No).await;
///
///     /************************************************************
///
///             Implement integration test logic here
///
///     *************************************************************/
///
///     test_case.end().await;
/// }
/// ```
pub struct TestCase {
    pub app_state: AppState,
    pub upstream: FakeLookups,
    app_handle: JoinHandle<()>,
    shutdown_signal: oneshot::Sender<()>,
    pub http_client: reqwest::Client,
}

impl TestCase {
    pub async fn begin(mut app_settings: AppSettings, tracing: EnableTracing) -> Self {
        if tracing == EnableTracing::Yes {
            enable_tracing();
        }
        let upstream = FakeLookups::start().await;
        app_settings.twilio.base_url = upstream.base_url.clone();

        let TestApp {
            app_settings,
            listener,
        } = configure_test_app(app_settings).await;
        let http_client = create_http_client(&app_settings.lookup).unwrap();
        let app_state = AppState {
            app_settings,
            http_client,
        };
        let (app_handle, shutdown_signal) = spawn_app(app_state.clone(), listener).await;
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap();
        Self {
            app_state,
            upstream,
            app_handle,
            shutdown_signal,
            http_client,
        }
    }

    pub async fn end(self) {
        self.shutdown_signal.send(()).unwrap();
        self.app_handle.join().unwrap();
    }

    pub fn origin(&self) -> String {
        self.app_state.app_settings.http.origin()
    }

    pub async fn lookup(&self, body: &Value) -> reqwest::Response {
        let uri = format!("{}/lookup", self.origin());
        self.http_client.post(&uri).json(body).send().await.unwrap()
    }

    pub async fn lookup_raw(&self, method: reqwest::Method, body: &str) -> reqwest::Response {
        let uri = format!("{}/lookup", self.origin());
        self.http_client
            .request(method, &uri)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    /// Builds an offline cache that talks to this test's server
    pub fn offline_cache(
        &self,
        storage: Arc<MemoryCacheStorage>,
    ) -> OfflineCache<MemoryCacheStorage, HttpNetwork> {
        let settings = &self.app_state.app_settings;
        let config = offline_config(&settings.http, &settings.offline);
        OfflineCache::new(config, storage, HttpNetwork::new(self.http_client.clone()))
    }
}

pub async fn split_response(response: reqwest::Response) -> (reqwest::StatusCode, Value) {
    let status = response.status();
    let body = response.json::<Value>().await.unwrap();
    (status, body)
}
