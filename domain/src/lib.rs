use std::borrow::Cow;

pub mod models;
pub mod repositories;

/// ドメインエラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainErrorKind {
    /// 検証エラー
    Validation,
    /// 許可されていないHTTPメソッド
    MethodNotAllowed,
    /// 設定エラー
    Configuration,
    /// 外部サービスに照会できない
    Unavailable,
    /// 電話番号1件の照会の失敗
    Lookup,
    /// ネットワークエラー
    Network,
    /// キャッシュストレージのエラー
    Cache,
    /// ライフサイクルの状態が不正
    InvalidState,
}

/// ドメインエラー
#[derive(Debug, thiserror::Error)]
#[error("{}", .messages.join(", "))]
pub struct DomainError {
    /// エラーの種類
    pub kind: DomainErrorKind,
    /// エラーメッセージ
    pub messages: Vec<Cow<'static, str>>,
    /// エラーの原因
    pub source: anyhow::Error,
}

impl DomainError {
    /// メッセージから原因を作成して、ドメインエラーを構築する。
    pub fn new(kind: DomainErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        let message = message.into();
        Self {
            kind,
            messages: vec![message.clone()],
            source: anyhow::anyhow!(message),
        }
    }
}

/// ドメイン結果
pub type DomainResult<T> = Result<T, DomainError>;

fn starts_or_ends_with_whitespace(s: &str) -> bool {
    s.chars().next().is_some_and(|ch| ch.is_whitespace())
        || s.chars().last().is_some_and(|ch| ch.is_whitespace())
}
