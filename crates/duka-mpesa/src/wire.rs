//! Lenient field decoding.
//!
//! Daraja is inconsistent about JSON types: `expires_in` is a string,
//! `ResultCode` is a number in callbacks and a string in query replies,
//! `TransAmount` arrives either way. These helpers accept both.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Reads a string or number as an optional string.
pub(crate) fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| value_to_string(&v)))
}

/// Reads a number or numeric string as an optional integer.
pub(crate) fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| value_to_i64(&v)))
}

/// Like [`opt_i64`] but the field must be present and numeric.
pub(crate) fn required_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_i64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {}", value)))
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Loose {
        #[serde(default, deserialize_with = "opt_i64")]
        code: Option<i64>,
        #[serde(default, deserialize_with = "opt_string")]
        text: Option<String>,
    }

    #[test]
    fn test_accepts_strings_and_numbers() {
        let a: Loose = serde_json::from_value(json!({"code": "1032", "text": 254712345678u64})).unwrap();
        assert_eq!(a.code, Some(1032));
        assert_eq!(a.text.as_deref(), Some("254712345678"));

        let b: Loose = serde_json::from_value(json!({"code": 0})).unwrap();
        assert_eq!(b.code, Some(0));
        assert_eq!(b.text, None);

        let c: Loose = serde_json::from_value(json!({"code": null, "text": null})).unwrap();
        assert_eq!(c.code, None);
    }
}
