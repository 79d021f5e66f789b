use garde::Validate as _;
use serde::Serialize;

use crate::{DomainError, DomainErrorKind, DomainResult, impl_string_primitive};

/// 回線種別を判別できなかったときの値
pub const UNKNOWN_LINE_TYPE: &str = "unknown";
/// キャリア名や国コードを判別できなかったときの値
pub const UNKNOWN: &str = "Unknown";
/// 照会する電話番号がないときのメッセージ
pub const NO_NUMBERS_MESSAGE: &str = "No numbers provided";
/// 照会に失敗したが、原因のメッセージがないときのメッセージ
pub const LOOKUP_FAILED_MESSAGE: &str = "Lookup failed";

/// 電話番号
///
/// 前後の空白をトリムした、空でない文字列である。
/// 書式の検証は照会先のサービスに任せる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, garde::Validate)]
pub struct PhoneNumber(#[garde(length(chars, min = 1))] pub String);
impl_string_primitive!(PhoneNumber);

/// 照会する電話番号のリスト
///
/// 入力の順番を保持する。重複は取り除かない。
#[derive(Debug, Clone)]
pub struct PhoneNumbers(Vec<PhoneNumber>);

impl PhoneNumbers {
    /// 照会する電話番号のリストを構築する。
    ///
    /// 候補をトリムして、空になった候補を取り除く。
    /// 照会できる電話番号が1つもない場合は検証エラーを返す。
    pub fn new<I>(candidates: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let numbers = candidates
            .into_iter()
            .filter_map(|candidate| PhoneNumber::new(candidate).ok())
            .collect::<Vec<_>>();
        if numbers.is_empty() {
            return Err(DomainError::new(
                DomainErrorKind::Validation,
                NO_NUMBERS_MESSAGE,
            ));
        }
        Ok(Self(numbers))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PhoneNumber> {
        self.0.iter()
    }
}

impl IntoIterator for PhoneNumbers {
    type Item = PhoneNumber;
    type IntoIter = std::vec::IntoIter<PhoneNumber>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// キャリア照会サービスから得た電話番号の情報
///
/// 照会サービスに依存しない形式で表現する。すべての項目は照会サービスが返さないことがある。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarrierRecord {
    /// 回線種別インテリジェンスが報告した回線種別（mobile、landline、fixedVoipなど）
    pub line_type: Option<String>,
    /// キャリア情報が報告した粗い回線種別
    pub carrier_type: Option<String>,
    /// キャリア情報が報告したキャリア名
    pub carrier_name: Option<String>,
    /// 回線種別インテリジェンスが報告したキャリア名
    pub line_type_carrier_name: Option<String>,
    /// ISO国コード
    pub country_code: Option<String>,
    /// 電話番号が有効かどうか
    pub valid: Option<bool>,
}

/// 電話番号の照会結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LookupResult {
    /// 照会に成功した電話番号の情報
    Found(CarrierInfo),
    /// 照会に失敗した電話番号とその理由
    Failed(LookupFailure),
}

/// 照会に成功した電話番号の情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarrierInfo {
    /// 電話番号
    pub number: String,
    /// 回線種別
    #[serde(rename = "type")]
    pub line_type: String,
    /// キャリア名
    pub carrier: String,
    /// 国コード
    pub country: String,
    /// 有効フラグ
    pub valid: bool,
}

/// 照会に失敗した電話番号とその理由
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFailure {
    /// 電話番号
    pub number: String,
    /// エラーメッセージ
    pub error: String,
}

impl LookupResult {
    /// 照会サービスから得た情報から照会結果を構築する。
    pub fn found(number: PhoneNumber, record: &CarrierRecord) -> Self {
        Self::Found(CarrierInfo {
            number: number.0,
            line_type: resolve_line_type(record),
            carrier: resolve_carrier_name(record),
            country: resolve_country(record),
            valid: record.valid.unwrap_or(true),
        })
    }

    /// 照会に失敗した照会結果を構築する。
    ///
    /// メッセージが空の場合は、汎用的なメッセージに置き換える。
    pub fn failed(number: PhoneNumber, message: impl Into<String>) -> Self {
        let message = message.into();
        let error = if message.trim().is_empty() {
            LOOKUP_FAILED_MESSAGE.to_string()
        } else {
            message
        };
        Self::Failed(LookupFailure {
            number: number.0,
            error,
        })
    }

    /// 照会した電話番号を返す。
    pub fn number(&self) -> &str {
        match self {
            Self::Found(info) => &info.number,
            Self::Failed(failure) => &failure.number,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// 候補を優先順に評価して、最初の空でない値を返す。
fn first_present<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a String>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
}

/// 回線種別を決定する。
///
/// 優先順位は、回線種別インテリジェンスの回線種別、キャリア情報の回線種別、`unknown`の順である。
pub fn resolve_line_type(record: &CarrierRecord) -> String {
    first_present([record.line_type.as_ref(), record.carrier_type.as_ref()])
        .unwrap_or(UNKNOWN_LINE_TYPE)
        .to_string()
}

/// キャリア名を決定する。
///
/// 優先順位は、キャリア情報のキャリア名、回線種別インテリジェンスのキャリア名、`Unknown`の順である。
/// Lookups v2はキャリア情報を返さないことが多いため、回線種別インテリジェンスのキャリア名も意図的に参照する。
pub fn resolve_carrier_name(record: &CarrierRecord) -> String {
    first_present([
        record.carrier_name.as_ref(),
        record.line_type_carrier_name.as_ref(),
    ])
    .unwrap_or(UNKNOWN)
    .to_string()
}

/// 国コードを決定する。
pub fn resolve_country(record: &CarrierRecord) -> String {
    first_present([record.country_code.as_ref()])
        .unwrap_or(UNKNOWN)
        .to_string()
}
