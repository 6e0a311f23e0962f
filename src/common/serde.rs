//! Lenient deserializers for vendor payloads.
//!
//! Vendors disagree on how they encode counters and identifiers: Vertex sends
//! `int64` fields as JSON strings, Anthropic sends plain numbers, and either may
//! send `null` for a field that has not been populated yet. None of these
//! shapes should fail a whole status read, so the helpers here fall back to a
//! default instead of erroring.

use serde_json::Value;

/// Counters that may arrive as JSON numbers, numeric strings, or null.
pub(crate) mod lenient_u64 {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Deserializes a counter, treating anything unreadable as zero.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(super::u64_from_value(&Value::deserialize(deserializer)?))
    }
}

/// Optional strings where a non-string value is treated as absent.
pub(crate) mod lenient_string {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Deserializes an `Option<String>`, mapping non-string values to `None`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

/// Deserializes `null` into `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de> + Default,
{
    use serde::Deserialize;
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserializes a nested object, treating a non-object or an undecodable
/// object as `T::default()`.
pub(crate) fn lenient_object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    use serde::Deserialize;
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => T::default(),
    })
}

/// Reads a non-negative integer out of a number or numeric string.
pub(crate) fn u64_from_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
