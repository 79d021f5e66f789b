pub mod handler;

use std::borrow::Cow;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use domain::{DomainError, DomainErrorKind};

/// API結果
type ApiResult<T> = Result<T, ApiError>;

/// APIエラー
#[derive(Debug)]
pub struct ApiError {
    /// HTTPステータスコード
    pub status_code: StatusCode,
    /// エラーメッセージ
    pub message: Cow<'static, str>,
    /// クライアントが判別するためのエラーコード
    pub code: Option<&'static str>,
}

/// APIエラーのレスポンスボディ
#[derive(Debug, Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: &self.message,
            code: self.code,
        };
        (self.status_code, Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        let status_code = match error.kind {
            DomainErrorKind::Validation => StatusCode::BAD_REQUEST,
            DomainErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DomainErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            DomainErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            DomainErrorKind::Lookup => StatusCode::BAD_GATEWAY,
            DomainErrorKind::Network => StatusCode::BAD_GATEWAY,
            DomainErrorKind::Cache => StatusCode::INTERNAL_SERVER_ERROR,
            DomainErrorKind::InvalidState => StatusCode::CONFLICT,
        };
        let code = match error.kind {
            DomainErrorKind::Configuration => Some(MISSING_CREDENTIALS_CODE),
            _ => None,
        };
        Self {
            status_code,
            message: error.to_string().into(),
            code,
        }
    }
}

/// 認証情報が設定されていないことを示すエラーコード
///
/// 設定エラーは認証情報の欠落だけで発生する。
pub const MISSING_CREDENTIALS_CODE: &str = "MISSING_CREDENTIALS";

const MISSING_CREDENTIALS_MESSAGE: &str = "Twilio credentials not configured on server";

pub fn missing_credentials() -> DomainError {
    DomainError::new(DomainErrorKind::Configuration, MISSING_CREDENTIALS_MESSAGE)
}

const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method Not Allowed";

pub fn method_not_allowed() -> DomainError {
    DomainError::new(DomainErrorKind::MethodNotAllowed, METHOD_NOT_ALLOWED_MESSAGE)
}
