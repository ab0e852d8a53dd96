//! Sensitive-data redaction for captured headers and bodies.
//!
//! # Responsibilities
//! - Replace sensitive header values with `[REDACTED]`
//! - Walk JSON bodies and redact sensitive keys at any depth
//! - Redact URL-encoded form bodies (request side only)
//!
//! # Design Decisions
//! - Name matching is exact and case-insensitive
//! - Headers, request bodies and response bodies each have their own field set
//! - Bodies that cannot be parsed are passed through unmodified

use std::collections::HashSet;

use axum::http::HeaderMap;
use serde_json::{Map, Value};

use crate::config::schema::HttpLoggingConfig;

/// Replacement value for redacted fields.
pub const REDACTED: &str = "[REDACTED]";

/// Case-insensitive set of field names.
#[derive(Debug, Clone, Default)]
pub struct FieldSet(HashSet<String>);

impl FieldSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&name.to_ascii_lowercase())
    }
}

/// Redaction rules for one interceptor policy.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    headers: FieldSet,
    request_fields: FieldSet,
    response_fields: FieldSet,
}

impl Redactor {
    pub fn from_config(config: &HttpLoggingConfig) -> Self {
        Self {
            headers: FieldSet::new(&config.sensitive_headers),
            request_fields: FieldSet::new(&config.sensitive_body_fields),
            response_fields: FieldSet::new(&config.sensitive_response_fields),
        }
    }

    /// Headers as a JSON map; repeated headers become arrays.
    pub fn redact_headers(&self, headers: &HeaderMap) -> Map<String, Value> {
        let mut out = Map::new();
        for name in headers.keys() {
            let key = name.as_str().to_string();
            if self.headers.contains(name.as_str()) {
                out.insert(key, Value::String(REDACTED.to_string()));
                continue;
            }
            let mut values: Vec<Value> = headers
                .get_all(name)
                .iter()
                .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect();
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            out.insert(key, value);
        }
        out
    }

    /// Redact a request body: JSON first, then URL-encoded form.
    pub fn redact_request_body(&self, body: &[u8], content_type: Option<&str>) -> Value {
        if let Ok(mut json) = serde_json::from_slice::<Value>(body) {
            redact_value(&mut json, &self.request_fields);
            return json;
        }
        let text = String::from_utf8_lossy(body);
        if looks_like_form(&text, content_type) {
            return Value::String(redact_form(&text, &self.request_fields));
        }
        Value::String(text.into_owned())
    }

    /// Redact a response body. Only JSON is understood.
    pub fn redact_response_body(&self, body: &[u8]) -> Value {
        match serde_json::from_slice::<Value>(body) {
            Ok(mut json) => {
                redact_value(&mut json, &self.response_fields);
                json
            }
            Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
        }
    }
}

/// Recursively replace values whose key is in `fields`.
pub fn redact_value(value: &mut Value, fields: &FieldSet) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if fields.contains(key) {
                    *val = Value::String(REDACTED.to_string());
                } else {
                    redact_value(val, fields);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item, fields);
            }
        }
        _ => {}
    }
}

/// Declared as a form, or shaped like `key=value&key=value` whatever the declared type.
fn looks_like_form(text: &str, content_type: Option<&str>) -> bool {
    let declared = content_type.is_some_and(|ct| {
        ct.trim()
            .to_ascii_lowercase()
            .starts_with("application/x-www-form-urlencoded")
    });
    declared || is_pair_list(text)
}

fn is_pair_list(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text
            .split('&')
            .all(|pair| pair.split_once('=').is_some_and(|(key, _)| !key.is_empty()))
}

/// `user[password]` is matched on its innermost segment.
fn form_leaf(key: &str) -> &str {
    match key.rfind('[') {
        Some(open) => key[open + 1..].trim_end_matches(']'),
        None => key,
    }
}

fn redact_form(text: &str, fields: &FieldSet) -> String {
    let pairs = url::form_urlencoded::parse(text.as_bytes()).map(|(key, value)| {
        if fields.contains(&key) || fields.contains(form_leaf(&key)) {
            (key.into_owned(), REDACTED.to_string())
        } else {
            (key.into_owned(), value.into_owned())
        }
    });
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
