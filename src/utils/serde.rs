/*!
 * Serde utilities for common serialization/deserialization patterns.
 *
 * Reusable helpers for durations carried as milliseconds and for
 * numeric values that may arrive as numbers or strings in YAML/JSON.
 */

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Serialize a [`Duration`] as whole milliseconds.
///
/// # Usage with serde
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize, Deserialize)]
/// struct Timing {
///     #[serde(with = "tasker_pipeline::utils::serde::duration_ms")]
///     elapsed: Duration,
/// }
///
/// let json = serde_json::to_string(&Timing { elapsed: Duration::from_millis(1500) }).unwrap();
/// assert_eq!(json, r#"{"elapsed":1500}"#);
/// ```
pub mod duration_ms {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Read an integer that may be represented as a number or a string.
///
/// Handles flexible YAML/JSON input where users quote numeric values:
/// - Integer numbers
/// - Floating-point numbers (truncated)
/// - String representations of numbers
///
/// Anything else, including out-of-range values, yields `None`.
pub fn coerce_i32(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) if n.is_f64() => n.as_f64().map(|f| f as i32),
        serde_json::Value::Number(n) => n.as_i64().and_then(|i| i32::try_from(i).ok()),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i32>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i32)),
        _ => None,
    }
}
