//! Request parameter checks shared by JSON bodies and query strings.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ApiError;

fn quoted<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|n| format!("'{}'", n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Require every name in `required`, allow those in `optional`, reject the
/// rest. Messages list names sorted.
pub fn check_names(present: &[&str], required: &[&str], optional: &[&str]) -> Result<(), ApiError> {
    let mut missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !present.contains(name))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(ApiError::bad_request(format!(
            "Missing request parameters: {}",
            quoted(missing)
        )));
    }

    let mut unexpected: Vec<&str> = present
        .iter()
        .copied()
        .filter(|p| !required.contains(p) && !optional.contains(p))
        .collect();
    if !unexpected.is_empty() {
        unexpected.sort_unstable();
        return Err(ApiError::bad_request(format!(
            "Unexpected request parameters: {}",
            quoted(unexpected)
        )));
    }
    Ok(())
}

/// Parse a JSON object body holding exactly the `required` string fields.
pub fn json_string_fields(
    body: &[u8],
    required: &[&str],
) -> Result<BTreeMap<String, String>, ApiError> {
    let object: Map<String, Value> = serde_json::from_slice(body)
        .map_err(|_| ApiError::bad_request("Invalid JSON object in request body."))?;
    let names: Vec<&str> = object.keys().map(String::as_str).collect();
    check_names(&names, required, &[])?;

    object
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name, s)),
            _ => Err(ApiError::bad_request(format!(
                "Request parameter '{}' must be a string.",
                name
            ))),
        })
        .collect()
}

/// Check query parameters against the `required` and `optional` names.
pub fn query_fields(
    query: &BTreeMap<String, String>,
    required: &[&str],
    optional: &[&str],
) -> Result<(), ApiError> {
    let names: Vec<&str> = query.keys().map(String::as_str).collect();
    check_names(&names, required, optional)
}
