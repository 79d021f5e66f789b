use reqwest::{Method, StatusCode};
use secrecy::SecretString;
use serde_json::json;

use crate::{
    helpers::{
        BARE_NUMBER, LANDLINE_NUMBER, MOBILE_NUMBER, NOT_FOUND_MESSAGE, SLOW_NUMBER,
        UNKNOWN_NUMBER, load_app_settings_for_testing,
    },
    test_case::{EnableTracing, TestCase, split_response},
};

/// "AC00000000000000000000000000000000:test-auth-token" in base64
const EXPECTED_AUTHORIZATION: &str =
    "Basic QUMwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDp0ZXN0LWF1dGgtdG9rZW4=";

#[tokio::test]
async fn numbers_are_looked_up_in_request_order() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;

    let response = test_case
        .lookup(&json!({
            "numbers": [
                format!("  {}  ", MOBILE_NUMBER),
                UNKNOWN_NUMBER,
                "",
                LANDLINE_NUMBER,
                BARE_NUMBER,
                null
            ]
        }))
        .await;
    let (status_code, body) = split_response(response).await;

    assert_eq!(status_code, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "results": [
                {
                    "number": MOBILE_NUMBER,
                    "type": "mobile",
                    "carrier": "Verizon Wireless",
                    "country": "US",
                    "valid": true
                },
                {
                    "number": UNKNOWN_NUMBER,
                    "error": NOT_FOUND_MESSAGE
                },
                {
                    "number": LANDLINE_NUMBER,
                    "type": "landline",
                    "carrier": "BT",
                    "country": "GB",
                    "valid": false
                },
                {
                    "number": BARE_NUMBER,
                    "type": "unknown",
                    "carrier": "Unknown",
                    "country": "Unknown",
                    "valid": true
                }
            ]
        })
    );
    assert_eq!(test_case.upstream.recorder.hits(), 4);

    test_case.end().await;
}

#[tokio::test]
async fn upstream_calls_use_basic_auth() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;

    let response = test_case
        .lookup(&json!({ "numbers": [MOBILE_NUMBER, LANDLINE_NUMBER] }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let authorizations = test_case.upstream.recorder.authorizations();
    assert_eq!(authorizations.len(), 2);
    assert!(authorizations.iter().all(|a| a == EXPECTED_AUTHORIZATION));

    test_case.end().await;
}

#[tokio::test]
async fn single_number_is_accepted() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;

    let response = test_case.lookup(&json!({ "number": MOBILE_NUMBER })).await;
    let (status_code, body) = split_response(response).await;

    assert_eq!(status_code, StatusCode::OK);
    assert_eq!(body["results"][0]["number"], MOBILE_NUMBER);
    assert_eq!(body["results"][0]["type"], "mobile");
    assert_eq!(body["results"].as_array().unwrap().len(), 1);

    test_case.end().await;
}

#[tokio::test]
async fn duplicate_numbers_are_looked_up_each_time() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;

    let response = test_case
        .lookup(&json!({ "numbers": [MOBILE_NUMBER, MOBILE_NUMBER] }))
        .await;
    let (status_code, body) = split_response(response).await;

    assert_eq!(status_code, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(test_case.upstream.recorder.hits(), 2);

    test_case.end().await;
}

#[tokio::test]
async fn slow_lookup_times_out_without_failing_the_batch() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;

    let response = test_case
        .lookup(&json!({ "numbers": [SLOW_NUMBER, MOBILE_NUMBER] }))
        .await;
    let (status_code, body) = split_response(response).await;

    assert_eq!(status_code, StatusCode::OK);
    assert_eq!(
        body["results"][0],
        json!({ "number": SLOW_NUMBER, "error": "Lookup timed out" })
    );
    assert_eq!(body["results"][1]["carrier"], "Verizon Wireless");

    test_case.end().await;
}

#[tokio::test]
async fn empty_requests_are_rejected_without_calling_upstream() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;

    for body in [
        json!({}),
        json!({ "numbers": [] }),
        json!({ "numbers": ["", "   ", null, false, 0] }),
        json!({ "number": "   " }),
    ] {
        let response = test_case.lookup(&body).await;
        let (status_code, body) = split_response(response).await;
        assert_eq!(status_code, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "No numbers provided" }));
    }
    let response = test_case.lookup_raw(Method::POST, "{ not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test_case.upstream.recorder.hits(), 0);

    test_case.end().await;
}

#[tokio::test]
async fn methods_other_than_post_are_not_allowed() {
    let app_settings = load_app_settings_for_testing();
    let test_case = TestCase::begin(app_settings, EnableTracing::Yes).await;

    for method in [Method::GET, Method::PUT, Method::PATCH, Method::DELETE] {
        let response = test_case.lookup_raw(method, "{}").await;
        let (status_code, body) = split_response(response).await;
        assert_eq!(status_code, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({ "error": "Method Not Allowed" }));
    }

    test_case.end().await;
}

#[tokio::test]
async fn missing_credentials_are_reported() {
    let mut app_settings = load_app_settings_for_testing();
    app_settings.twilio.auth_token = Some(SecretString::new("".into()));
    let test_case = TestCase::begin(app_settings, EnableTracing::No).await;

    let response = test_case.lookup(&json!({ "numbers": [MOBILE_NUMBER] })).await;
    let (status_code, body) = split_response(response).await;

    assert_eq!(status_code, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({
            "error": "Twilio credentials not configured on server",
            "code": "MISSING_CREDENTIALS"
        })
    );
    assert_eq!(test_case.upstream.recorder.hits(), 0);

    test_case.end().await;
}
