//! LLM-backed matcher: asks a language model whether a captured response
//! produced a value.
//!
//! The model sees the user's action description, the value, and the
//! candidate's response body (truncated to a byte budget so huge payloads
//! cannot blow the context window), and must answer with a strict JSON
//! verdict.

use std::error::Error;

use crate::ports::llm::{CompletionRequest, LlmClient};
use crate::ports::matcher::{MatchFuture, MatchQuery, MatchVerdict, SemanticMatcher};

/// Response-body bytes embedded in a match prompt before truncation.
const DEFAULT_BODY_BUDGET: usize = 100_000;

const VERDICT_MAX_TOKENS: u32 = 512;

/// Matcher that delegates the produced-by question to a language model.
pub struct LlmMatcher {
    llm: Box<dyn LlmClient>,
    model: String,
    body_budget: usize,
}

impl LlmMatcher {
    /// Creates a matcher over the given client and model id.
    #[must_use]
    pub fn new(llm: Box<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            body_budget: DEFAULT_BODY_BUDGET,
        }
    }

    /// Overrides the response-body byte budget.
    #[must_use]
    pub fn with_body_budget(mut self, budget: usize) -> Self {
        self.body_budget = budget;
        self
    }
}

impl SemanticMatcher for LlmMatcher {
    fn assess(&self, query: &MatchQuery<'_>) -> MatchFuture<'_> {
        let body = query.candidate.response_body.as_deref().unwrap_or("");
        let (body, truncated) = truncate_to_boundary(body, self.body_budget);
        let prompt = build_match_prompt(
            query.action,
            query.value,
            &query.candidate.method,
            &query.candidate.url,
            body,
            truncated,
        );
        let request = CompletionRequest {
            model: self.model.clone(),
            prompt,
            max_tokens: VERDICT_MAX_TOKENS,
        };

        Box::pin(async move {
            let response = self.llm.complete(&request).await?;
            tracing::debug!(
                "match verdict used {} prompt / {} completion tokens",
                response.prompt_tokens,
                response.completion_tokens
            );
            parse_verdict(&response.text)
        })
    }
}

fn build_match_prompt(
    action: &str,
    value: &str,
    method: &str,
    url: &str,
    body: &str,
    truncated: bool,
) -> String {
    let truncation_note = if truncated {
        "\n(response body truncated)"
    } else {
        ""
    };
    format!(
        r#"You are analyzing captured API traffic to reverse-engineer which response produced a value used by a later request.

The user's goal: {action}

A later request uses this value: {value}

Candidate earlier request: {method} {url}
Its response body:{truncation_note}
{body}

Question: does this response contain or produce the value, so that a client could extract it from here?
Count semantic matches too (the same value re-encoded or embedded in a larger field).

Respond with a JSON object:
- If yes: {{"match": true, "location": "<JSON pointer or short description of where>"}}
- If no: {{"match": false}}

Respond ONLY with the JSON object, no other text."#
    )
}

fn parse_verdict(text: &str) -> Result<MatchVerdict, Box<dyn Error + Send + Sync>> {
    let value: serde_json::Value = serde_json::from_str(response_json_text(text))
        .map_err(|err| format!("matcher returned invalid JSON: {err}"))?;

    let matched = value
        .get("match")
        .and_then(serde_json::Value::as_bool)
        .ok_or("missing 'match' field in matcher response")?;

    let location = value
        .get("location")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|loc| !loc.is_empty() && *loc != "null")
        .map(String::from);

    if matched {
        Ok(MatchVerdict::hit(location))
    } else {
        Ok(MatchVerdict::miss())
    }
}

/// Models occasionally wrap the verdict in a code fence despite the
/// instructions; accept that rather than burning a retry on it.
pub(crate) fn response_json_text(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

fn truncate_to_boundary(body: &str, budget: usize) -> (&str, bool) {
    if body.len() <= budget {
        return (body, false);
    }
    let mut cut = budget;
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    (&body[..cut], true)
}
