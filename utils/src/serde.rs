use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// JSON配列を文字列のベクタとしてデシリアライズする。
///
/// 配列以外の値は`None`になる。
/// 配列の要素は[`coerce_to_string`]で文字列に変換され、変換できない要素は取り除かれる。
pub fn deserialize_option_loose_strings<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => Some(items.into_iter().filter_map(coerce_to_string).collect()),
        _ => None,
    })
}

/// JSON文字列を文字列としてデシリアライズする。
///
/// 文字列以外の値は、エラーにせず`None`になる。
pub fn deserialize_option_string_only<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// JSONのスカラー値を文字列に変換する。
///
/// `null`、`false`、数値の0、空文字、配列及びオブジェクトは`None`になる。
pub fn coerce_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        Value::Bool(true) => Some(String::from("true")),
        _ => None,
    }
}
