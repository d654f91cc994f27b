use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::core::errors::ApiError;

/// Form field carrying the real verb for browsers that can only POST.
pub const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        for (key, value) in pairs(&uri[query_start + 1..]) {
            params.insert(key, value);
        }
    }

    params
}

/// Decode a request body into one JSON value, whatever the encoding.
///
/// Urlencoded keys written as `outer[inner]` become nested objects, so
/// `listing[title]=A&listing[price]=100` and
/// `{"listing": {"title": "A", "price": "100"}}` decode identically.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if mime == "application/json" {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Malformed JSON body: {}", e)))?;
        return match value {
            Value::Object(_) => Ok(value),
            _ => Err(ApiError::BadRequest("JSON body must be an object".to_string())),
        };
    }

    let text = std::str::from_utf8(body)
        .map_err(|_| ApiError::BadRequest("Form body is not valid UTF-8".to_string()))?;
    Ok(parse_form(text))
}

pub fn parse_form(text: &str) -> Value {
    let mut root = Map::new();

    for (key, value) in pairs(text) {
        match split_nested(&key) {
            Some((outer, inner)) => {
                let slot = root
                    .entry(outer.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(nested) = slot {
                    nested.insert(inner.to_string(), Value::String(value));
                }
            }
            None => {
                root.insert(key, Value::String(value));
            }
        }
    }

    Value::Object(root)
}

/// Read a top-level string field, treating anything else as empty.
pub fn str_field<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// The overriding verb named by the body or the query string, upper-cased.
pub fn method_override(body: &Value, query: &HashMap<String, String>) -> Option<String> {
    let raw = body
        .get(METHOD_OVERRIDE_FIELD)
        .and_then(Value::as_str)
        .or_else(|| query.get(METHOD_OVERRIDE_FIELD).map(String::as_str))?;
    let verb = raw.trim().to_ascii_uppercase();
    if verb.is_empty() {
        None
    } else {
        Some(verb)
    }
}

fn pairs(query: &str) -> impl Iterator<Item = (String, String)> + '_ {
    query.split('&').filter(|p| !p.is_empty()).map(|param| {
        match param.find('=') {
            Some(eq_idx) => (decode(&param[..eq_idx]), decode(&param[eq_idx + 1..])),
            // Flag parameter without value
            None => (decode(param), String::new()),
        }
    })
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

fn split_nested(key: &str) -> Option<(&str, &str)> {
    let open = key.find('[')?;
    let inner = key[open + 1..].strip_suffix(']')?;
    if open == 0 || inner.is_empty() || inner.contains('[') {
        return None;
    }
    Some((&key[..open], inner))
}
