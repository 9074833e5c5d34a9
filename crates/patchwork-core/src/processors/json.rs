//! Opportunistic JSON parsing of `set` values
//!
//! Assistants often send arrays and objects as strings. A string that looks
//! like JSON is parsed first and the parsed value is kept when the target
//! accepts it. Otherwise the raw string is stored as sent, without a type
//! check, so a malformed JSON-looking string never fails the operation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static JSON_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\[\{].*[\]\}]$").expect("static regex compiles"));

/// Whether a string structurally looks like a JSON array or object
pub(crate) fn looks_like_json(raw: &str) -> bool {
    JSON_LIKE.is_match(raw)
}

/// Value to store for a `set`
///
/// `check` decides between the parsed and the raw form of a JSON-looking
/// string. Any other value must pass `check` itself.
///
/// # Errors
/// The rejection message of `check` for a value that does not look like JSON.
pub(crate) fn accepted_value<F>(value: &Value, check: F) -> Result<Value, String>
where
    F: Fn(&Value) -> Result<(), String>,
{
    if let Value::String(raw) = value {
        if looks_like_json(raw) {
            return Ok(match serde_json::from_str::<Value>(raw) {
                Ok(parsed) if check(&parsed).is_ok() => parsed,
                _ => value.clone(),
            });
        }
    }
    check(value).map(|()| value.clone())
}
