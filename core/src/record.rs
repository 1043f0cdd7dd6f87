//! Storage representation of entity lists.
//!
//! Each store key holds a JSON array of records using the entity field names
//! (`camelCase`). Dates are ISO-8601 local date-times without an offset,
//! e.g. `2026-10-17T14:30:00`.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a list of records as a JSON array.
pub fn encode_list<T: Serialize>(records: &[T]) -> serde_json::Result<String> {
    serde_json::to_string(records)
}

/// Decode a JSON array of records.
///
/// An empty or whitespace-only document is an empty list. Any other
/// malformed input, including an unknown enum name, is an error; the
/// caller decides how lenient to be.
pub fn decode_list<T: DeserializeOwned>(raw: &str) -> serde_json::Result<Vec<T>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}
