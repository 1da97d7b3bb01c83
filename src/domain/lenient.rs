//! Serde helpers for the backend's loosely typed JSON.
//!
//! Ids arrive as numbers or strings, amounts as numbers, numeric strings or
//! null, flags as booleans or 0/1. Anything unparseable becomes `None`
//! instead of failing the whole snapshot.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a decimal from a JSON number or string. Returns `None` when absent or unparseable.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Required id: number or string.
pub mod id {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        scalar_to_string(value).ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
    }
}

/// Optional id: number, string, or null.
pub mod opt_id {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<Value> = Option::deserialize(deserializer)?;
        Ok(value.and_then(scalar_to_string))
    }
}

/// Optional decimal amount.
pub mod decimal {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<Value> = Option::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(parse_decimal))
    }
}

/// Optional float (feed prices). Non-finite values are rejected.
pub mod float {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<Value> = Option::deserialize(deserializer)?;
        let parsed = match value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(parsed.filter(|v| v.is_finite()))
    }
}

/// Optional unsigned integer (steps, code lengths).
pub mod count {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<Value> = Option::deserialize(deserializer)?;
        let parsed = match value {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        Ok(parsed.and_then(|v| u32::try_from(v).ok()))
    }
}

/// Optional flag: bool, 0/1, or "true"/"1".
pub mod flag {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<Value> = Option::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Bool(b)) => Some(b),
            Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" | "" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }
}

/// Optional trimmed text; empty strings become `None`.
pub mod text {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<Value> = Option::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(with = "id")]
        id: String,
        #[serde(default, with = "decimal")]
        amount: Option<Decimal>,
        #[serde(default, with = "count")]
        step: Option<u32>,
        #[serde(default, with = "flag")]
        read: Option<bool>,
        #[serde(default, with = "float")]
        price: Option<f64>,
    }

    #[test]
    fn test_numeric_id_becomes_string() {
        let p: Probe = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(p.id, "42");
        assert!(p.amount.is_none());
    }

    #[test]
    fn test_amount_from_string_and_number() {
        let p: Probe = serde_json::from_str(r#"{"id": "a", "amount": "12.50"}"#).unwrap();
        assert_eq!(p.amount, Some(Decimal::new(1250, 2)));

        let p: Probe = serde_json::from_str(r#"{"id": "a", "amount": 3}"#).unwrap();
        assert_eq!(p.amount, Some(Decimal::from(3)));
    }

    #[test]
    fn test_unparseable_values_become_none() {
        let p: Probe = serde_json::from_str(
            r#"{"id": "a", "amount": "abc", "step": "x", "read": "maybe", "price": "n/a"}"#,
        )
        .unwrap();
        assert!(p.amount.is_none());
        assert!(p.step.is_none());
        assert!(p.read.is_none());
        assert!(p.price.is_none());
    }

    #[test]
    fn test_flag_accepts_integers() {
        let p: Probe = serde_json::from_str(r#"{"id": 1, "read": 1}"#).unwrap();
        assert_eq!(p.read, Some(true));
    }

    #[test]
    fn test_step_from_string() {
        let p: Probe = serde_json::from_str(r#"{"id": 1, "step": "2"}"#).unwrap();
        assert_eq!(p.step, Some(2));
    }

    #[test]
    fn test_missing_id_fails() {
        assert!(serde_json::from_str::<Probe>(r#"{"id": null}"#).is_err());
    }
}
