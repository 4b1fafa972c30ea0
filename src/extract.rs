//! Parameter extraction: mining a request for the dynamic values that some
//! earlier response may have produced.
//!
//! Extraction is deliberately over-inclusive. A value that is flagged here
//! but has no producer simply ends up as a free parameter; a dynamic value
//! that extraction misses is a dependency the whole pipeline never sees.
//! The heuristics lean on value shape first and parameter names second.

use std::collections::HashSet;
use std::fmt;

use crate::traffic::{percent_decode, RecordId, TrafficRecord};

/// Where in a request a dynamic value was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentLocation {
    /// Zero-based index among the non-empty URL path segments.
    PathSegment(usize),
    /// Query parameter name.
    Query(String),
    /// Request header name.
    Header(String),
    /// JSON pointer or form field name within the request body.
    Body(String),
}

impl fmt::Display for FragmentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathSegment(index) => write!(f, "path[{index}]"),
            Self::Query(name) => write!(f, "query:{name}"),
            Self::Header(name) => write!(f, "header:{name}"),
            Self::Body(pointer) => write!(f, "body:{pointer}"),
        }
    }
}

/// One dynamic value found in a request.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Record the value was found in; the consumer side of any dependency.
    pub record: RecordId,
    /// First location the value appeared at within the request.
    pub location: FragmentLocation,
    /// The literal value.
    pub value: String,
}

/// Request headers that carry protocol plumbing rather than application
/// state. Their values are never worth a dependency search.
const STATIC_HEADERS: &[&str] = &[
    "accept",
    "accept-encoding",
    "accept-language",
    "cache-control",
    "connection",
    "content-length",
    "content-type",
    "dnt",
    "host",
    "origin",
    "pragma",
    "priority",
    "referer",
    "te",
    "upgrade-insecure-requests",
    "user-agent",
    "x-requested-with",
];

/// Extracts the dynamic fragments of one request.
///
/// Traversal order is fixed (path segments, query, headers, body) and each
/// distinct value is reported once, at its first location. Cookies are left
/// alone: session plumbing is handled outside dependency resolution.
#[must_use]
pub fn fragments(record: &TrafficRecord) -> Vec<Fragment> {
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |location: FragmentLocation, value: String, out: &mut Vec<Fragment>| {
        if value.is_empty() || !seen.insert(value.clone()) {
            return;
        }
        out.push(Fragment {
            record: record.id,
            location,
            value,
        });
    };

    for (index, segment) in record
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .enumerate()
    {
        let value = percent_decode(segment);
        if looks_dynamic(&value) {
            push(FragmentLocation::PathSegment(index), value, &mut out);
        }
    }

    for (name, value) in &record.query {
        if looks_dynamic(value) || signal_name(name, value) {
            push(FragmentLocation::Query(name.clone()), value.clone(), &mut out);
        }
    }

    for (name, value) in &record.request_headers {
        if is_static_header(name) {
            continue;
        }
        let value = strip_auth_scheme(name, value);
        if looks_dynamic(value) || signal_name(name, value) {
            push(
                FragmentLocation::Header(name.to_ascii_lowercase()),
                value.to_string(),
                &mut out,
            );
        }
    }

    if let Some(body) = record.request_json() {
        walk_body(&body, String::new(), &mut push, &mut out);
    } else if let (Some(body), Some(mime)) = (&record.request_body, &record.request_mime) {
        if mime.contains("x-www-form-urlencoded") {
            for part in body.split('&').filter(|part| !part.is_empty()) {
                let (name, value) = match part.split_once('=') {
                    Some((name, value)) => (percent_decode(name), percent_decode(value)),
                    None => (percent_decode(part), String::new()),
                };
                if looks_dynamic(&value) || signal_name(&name, &value) {
                    push(FragmentLocation::Body(name), value, &mut out);
                }
            }
        }
    }

    out
}

fn walk_body(
    value: &serde_json::Value,
    pointer: String,
    push: &mut impl FnMut(FragmentLocation, String, &mut Vec<Fragment>),
    out: &mut Vec<Fragment>,
) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let child_pointer = format!("{pointer}/{}", escape_pointer(key));
                walk_body(child, child_pointer, push, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let child_pointer = format!("{pointer}/{index}");
                walk_body(child, child_pointer, push, out);
            }
        }
        serde_json::Value::String(text) => {
            if looks_dynamic(text) || signal_name(last_pointer_key(&pointer), text) {
                push(FragmentLocation::Body(pointer), text.clone(), out);
            }
        }
        serde_json::Value::Number(number) => {
            let text = number.to_string();
            if looks_dynamic(&text) || signal_name(last_pointer_key(&pointer), &text) {
                push(FragmentLocation::Body(pointer), text, out);
            }
        }
        serde_json::Value::Bool(_) | serde_json::Value::Null => {}
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn last_pointer_key(pointer: &str) -> &str {
    pointer.rsplit('/').next().unwrap_or(pointer)
}

fn is_static_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with(':')
        || lower.starts_with("sec-")
        || lower == "cookie"
        || lower == "set-cookie"
        || STATIC_HEADERS.contains(&lower.as_str())
}

/// For `Authorization: Bearer <token>` and friends, the scheme word is
/// static; only the credential part can flow from an earlier response.
fn strip_auth_scheme<'a>(name: &str, value: &'a str) -> &'a str {
    if !name.eq_ignore_ascii_case("authorization") {
        return value;
    }
    match value.split_once(' ') {
        Some((scheme, rest)) if scheme.chars().all(char::is_alphabetic) => rest.trim_start(),
        _ => value,
    }
}

/// Does the parameter name itself suggest a server-issued value?
fn signal_name(name: &str, value: &str) -> bool {
    if matches!(value, "" | "true" | "false" | "null") || value.len() < 2 {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    lower == "authorization"
        || lower.ends_with("id")
        || lower.contains("token")
        || lower.contains("key")
        || lower.contains("session")
        || lower.contains("secret")
        || lower.contains("cursor")
        || lower.contains("nonce")
}

/// Shape heuristics for values that look server-issued rather than typed in
/// by a person or baked into the client.
#[must_use]
pub fn looks_dynamic(value: &str) -> bool {
    let value = value.trim();
    if value.len() < 2 {
        return false;
    }
    if value.chars().all(|ch| ch.is_ascii_digit()) {
        return true;
    }
    if is_uuid(value) || is_jwt(value) || is_date_like(value) {
        return true;
    }
    if value.len() >= 8 && value.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return true;
    }
    // long opaque tokens: alphanumeric-ish, mixing letters and digits
    if value.len() >= 8
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '='))
        && value.chars().any(|ch| ch.is_ascii_digit())
        && value.chars().any(|ch| ch.is_ascii_alphabetic())
    {
        return true;
    }
    false
}

fn is_uuid(value: &str) -> bool {
    if value.len() != 36 {
        return false;
    }
    value.char_indices().all(|(index, ch)| match index {
        8 | 13 | 18 | 23 => ch == '-',
        _ => ch.is_ascii_hexdigit(),
    })
}

fn is_jwt(value: &str) -> bool {
    value.starts_with("eyJ") && value.len() > 20 && value.bytes().filter(|b| *b == b'.').count() == 2
}

fn is_date_like(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::TrafficStore;

    fn record_from_har(request: &str) -> TrafficRecord {
        let text = format!(
            r#"{{
              "log": {{
                "entries": [
                  {{
                    "startedDateTime": "2024-03-01T10:00:00.000Z",
                    "request": {request},
                    "response": {{"status": 200}}
                  }}
                ]
              }}
            }}"#
        );
        let store = TrafficStore::from_har_str(&text).expect("parse");
        store.records()[0].clone()
    }

    #[test]
    fn path_segments_and_query_values() {
        let record = record_from_har(
            r#"{"method": "GET", "url": "https://api.example.com/v1/users/8f2a/bill?accountId=123&format=json"}"#,
        );
        let found = fragments(&record);
        let values: Vec<_> = found.iter().map(|f| f.value.as_str()).collect();
        assert!(!values.contains(&"v1"));
        assert!(!values.contains(&"users"));
        assert!(values.contains(&"123"));
        assert!(!values.contains(&"json"));

        let account = found.iter().find(|f| f.value == "123").expect("accountId");
        assert_eq!(account.location, FragmentLocation::Query("accountId".into()));
    }

    #[test]
    fn uuid_path_segment_is_dynamic() {
        let record = record_from_har(
            r#"{"method": "GET", "url": "https://api.example.com/orders/0e4f3b9a-1c2d-4e5f-8a9b-0c1d2e3f4a5b"}"#,
        );
        let found = fragments(&record);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location, FragmentLocation::PathSegment(1));
    }

    #[test]
    fn static_headers_skipped_signal_headers_mined() {
        let record = record_from_har(
            r#"{
              "method": "GET",
              "url": "https://api.example.com/me",
              "headers": [
                {"name": "Accept", "value": "application/json"},
                {"name": "Cookie", "value": "sid=abc123def456"},
                {"name": "X-Api-Key", "value": "k7pq2m9x4w"},
                {"name": "Authorization", "value": "Bearer tok4u8s3r"}
              ]
            }"#,
        );
        let found = fragments(&record);
        let values: Vec<_> = found.iter().map(|f| f.value.as_str()).collect();
        assert!(!values.contains(&"application/json"));
        assert!(!values.iter().any(|v| v.contains("sid=")));
        assert!(values.contains(&"k7pq2m9x4w"));
        assert!(values.contains(&"tok4u8s3r"));
        let auth = found.iter().find(|f| f.value == "tok4u8s3r").expect("auth");
        assert_eq!(auth.location, FragmentLocation::Header("authorization".into()));
    }

    #[test]
    fn json_body_leaves_get_pointers() {
        let record = record_from_har(
            r#"{
              "method": "POST",
              "url": "https://api.example.com/orders",
              "postData": {
                "mimeType": "application/json",
                "text": "{\"order\": {\"accountId\": 991, \"note\": \"hi\", \"draft\": false}}"
              }
            }"#,
        );
        let found = fragments(&record);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "991");
        assert_eq!(
            found[0].location,
            FragmentLocation::Body("/order/accountId".into())
        );
    }

    #[test]
    fn form_bodies_are_mined() {
        let record = record_from_har(
            r#"{
              "method": "POST",
              "url": "https://api.example.com/token",
              "postData": {
                "mimeType": "application/x-www-form-urlencoded",
                "text": "grant=refresh&session_token=a1b2c3d4e5"
              }
            }"#,
        );
        let found = fragments(&record);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "a1b2c3d4e5");
        assert_eq!(found[0].location, FragmentLocation::Body("session_token".into()));
    }

    #[test]
    fn duplicate_values_reported_once_at_first_location() {
        let record = record_from_har(
            r#"{
              "method": "POST",
              "url": "https://api.example.com/bill?accountId=123",
              "postData": {
                "mimeType": "application/json",
                "text": "{\"accountId\": \"123\"}"
              }
            }"#,
        );
        let found: Vec<_> = fragments(&record)
            .into_iter()
            .filter(|f| f.value == "123")
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location, FragmentLocation::Query("accountId".into()));
    }

    #[test]
    fn shape_heuristics() {
        assert!(looks_dynamic("2023"));
        assert!(looks_dynamic("42"));
        assert!(looks_dynamic("2024-03-01"));
        assert!(looks_dynamic("2024-03-01T10:00:00Z"));
        assert!(looks_dynamic("deadbeef01"));
        assert!(looks_dynamic("xK9mP2qR7t"));
        assert!(looks_dynamic("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.sig"));
        assert!(!looks_dynamic("users"));
        assert!(!looks_dynamic("7"));
        assert!(!looks_dynamic("latest"));
        assert!(!looks_dynamic("application/json"));
    }
}
