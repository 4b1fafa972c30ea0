//! Deterministic matcher backend based on substring containment.
//!
//! Checks the exact value first, then falls back to a case-insensitive
//! scan. When the response parses as JSON the reported location is the JSON
//! pointer of the first matching leaf; otherwise it is a byte offset.

use crate::ports::matcher::{MatchFuture, MatchQuery, MatchVerdict, SemanticMatcher};

/// Matcher that answers from response text alone, no model involved.
///
/// Useful for offline runs and for captures where values flow through
/// verbatim. It cannot see derived values (base64 wrapping, re-encoding),
/// which is what the LLM backend is for.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatcher;

impl SubstringMatcher {
    /// Creates the matcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn verdict(query: &MatchQuery<'_>) -> MatchVerdict {
        let Some(body) = query.candidate.response_body.as_deref() else {
            return MatchVerdict::miss();
        };
        let value = query.value;

        if let Some(offset) = body.find(value) {
            let location = query
                .candidate
                .response_json()
                .and_then(|json| find_pointer(&json, value, false))
                .or_else(|| Some(format!("offset:{offset}")));
            return MatchVerdict::hit(location);
        }

        let lower_body = body.to_lowercase();
        let lower_value = value.to_lowercase();
        if let Some(offset) = lower_body.find(&lower_value) {
            let location = query
                .candidate
                .response_json()
                .and_then(|json| find_pointer(&json, value, true))
                .or_else(|| Some(format!("offset:{offset}")));
            return MatchVerdict::hit(location);
        }

        MatchVerdict::miss()
    }
}

impl SemanticMatcher for SubstringMatcher {
    fn assess(&self, query: &MatchQuery<'_>) -> MatchFuture<'_> {
        let verdict = Self::verdict(query);
        Box::pin(async move { Ok(verdict) })
    }
}

/// Finds the JSON pointer of the first leaf equal to `target`.
fn find_pointer(value: &serde_json::Value, target: &str, case_insensitive: bool) -> Option<String> {
    fn walk(
        value: &serde_json::Value,
        pointer: &str,
        target: &str,
        case_insensitive: bool,
    ) -> Option<String> {
        match value {
            serde_json::Value::Object(map) => map.iter().find_map(|(key, child)| {
                let escaped = key.replace('~', "~0").replace('/', "~1");
                walk(child, &format!("{pointer}/{escaped}"), target, case_insensitive)
            }),
            serde_json::Value::Array(items) => items.iter().enumerate().find_map(|(index, child)| {
                walk(child, &format!("{pointer}/{index}"), target, case_insensitive)
            }),
            serde_json::Value::String(text) => {
                let hit = if case_insensitive {
                    text.eq_ignore_ascii_case(target) || text.to_lowercase().contains(&target.to_lowercase())
                } else {
                    text == target || text.contains(target)
                };
                hit.then(|| pointer.to_string())
            }
            serde_json::Value::Number(number) => {
                (number.to_string() == target).then(|| pointer.to_string())
            }
            serde_json::Value::Bool(_) | serde_json::Value::Null => None,
        }
    }
    let found = walk(value, "", target, case_insensitive)?;
    if found.is_empty() {
        // the whole document is a bare scalar
        Some("/".to_string())
    } else {
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::matcher::MatchQuery;
    use crate::traffic::TrafficStore;

    fn candidate(body: &str, mime: &str) -> crate::traffic::TrafficRecord {
        let text = format!(
            r#"{{
              "log": {{
                "entries": [
                  {{
                    "startedDateTime": "2024-03-01T10:00:00.000Z",
                    "request": {{"method": "GET", "url": "https://api.example.com/x"}},
                    "response": {{
                      "status": 200,
                      "content": {{"mimeType": "{mime}", "text": {}}}
                    }}
                  }}
                ]
              }}
            }}"#,
            serde_json::Value::String(body.to_string())
        );
        let store = TrafficStore::from_har_str(&text).expect("parse");
        store.records()[0].clone()
    }

    async fn assess(matcher: &SubstringMatcher, value: &str, body: &str, mime: &str) -> MatchVerdict {
        let record = candidate(body, mime);
        let query = MatchQuery {
            action: "test",
            value,
            candidate: &record,
        };
        matcher.assess(&query).await.expect("verdict")
    }

    #[tokio::test]
    async fn exact_hit_reports_json_pointer() {
        let matcher = SubstringMatcher::new();
        let verdict = assess(
            &matcher,
            "123",
            r#"{"account": {"id": 123, "name": "x"}}"#,
            "application/json",
        )
        .await;
        assert!(verdict.matched);
        assert_eq!(verdict.location.as_deref(), Some("/account/id"));
    }

    #[tokio::test]
    async fn case_insensitive_fallback() {
        let matcher = SubstringMatcher::new();
        let verdict = assess(
            &matcher,
            "ABC-1",
            r#"{"ref": "abc-1"}"#,
            "application/json",
        )
        .await;
        assert!(verdict.matched);
        assert_eq!(verdict.location.as_deref(), Some("/ref"));
    }

    #[tokio::test]
    async fn plain_text_hit_reports_offset() {
        let matcher = SubstringMatcher::new();
        let verdict = assess(&matcher, "tok-99", "session tok-99 issued", "text/plain").await;
        assert!(verdict.matched);
        assert_eq!(verdict.location.as_deref(), Some("offset:8"));
    }

    #[tokio::test]
    async fn absent_value_is_a_miss() {
        let matcher = SubstringMatcher::new();
        let verdict = assess(&matcher, "999", r#"{"id": 123}"#, "application/json").await;
        assert!(!verdict.matched);
        assert!(verdict.location.is_none());
    }
}
