//! Target selection: which captured request the user's action maps to.
//!
//! Two paths. A URL substring given on the command line is resolved locally
//! with no model involved; otherwise the action description and a filtered
//! request listing go to the model, which must name one record.

use std::fmt::Write as _;

use crate::adapters::llm_matcher::response_json_text;
use crate::ports::llm::{CompletionRequest, LlmClient};
use crate::traffic::{RecordId, TrafficRecord, TrafficStore};
use crate::{RetraceError, RetraceResult};

/// Upper bound on the selection prompt. Captures that blow past this need
/// trimming (`har_slim`) before the model can pick a target.
const PROMPT_BUDGET: usize = 800_000;

const SELECT_MAX_TOKENS: u32 = 256;

/// Resolves `--target`: the latest captured request whose URL contains the
/// needle, case-insensitively.
///
/// # Errors
///
/// Returns an error when nothing matches.
pub fn by_url_substring(store: &TrafficStore, needle: &str) -> RetraceResult<RecordId> {
    let wanted = needle.to_ascii_lowercase();
    store
        .records()
        .iter()
        .rev()
        .find(|record| record.url.to_ascii_lowercase().contains(&wanted))
        .map(|record| record.id)
        .ok_or_else(|| {
            RetraceError::invalid_input(format!("no captured request URL contains {needle:?}"))
        })
}

/// Asks the model which captured request performs the action.
///
/// Asset noise (scripts, styles, images, fonts) is filtered out of the
/// listing first; the model answers with a record label.
///
/// # Errors
///
/// Returns an error when the capture is empty, when the listing exceeds the
/// prompt budget, or when the model's answer is not a usable record label.
pub async fn by_action(
    store: &TrafficStore,
    llm: &dyn LlmClient,
    model: &str,
    action: &str,
) -> RetraceResult<RecordId> {
    if store.is_empty() {
        return Err(RetraceError::invalid_input(
            "capture contains no usable requests",
        ));
    }

    let mut candidates: Vec<&TrafficRecord> =
        store.records().iter().filter(|record| !is_noise(record)).collect();
    if candidates.is_empty() {
        candidates = store.records().iter().collect();
    }

    let prompt = build_target_prompt(action, &candidates);
    if prompt.len() > PROMPT_BUDGET {
        return Err(RetraceError::invalid_input(format!(
            "capture listing is too large for target selection ({} bytes); \
             trim the capture with har_slim first",
            prompt.len()
        )));
    }

    let request = CompletionRequest {
        model: model.to_string(),
        prompt,
        max_tokens: SELECT_MAX_TOKENS,
    };
    let response = llm
        .complete(&request)
        .await
        .map_err(|err| RetraceError::matcher(format!("target selection failed: {err}")))?;

    let (target, reason) = parse_target_response(&response.text)?;
    if store.get(target).is_none() {
        return Err(RetraceError::matcher(format!(
            "model picked {target}, which is not in the capture"
        )));
    }
    if let Some(reason) = reason {
        tracing::debug!("model picked {target}: {reason}");
    }
    Ok(target)
}

/// Page loads and static assets never carry the action; keep them out of the
/// model's listing.
fn is_noise(record: &TrafficRecord) -> bool {
    const ASSET_EXTENSIONS: &[&str] = &[
        ".js", ".mjs", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff",
        ".woff2", ".ttf", ".otf", ".map",
    ];
    let path = record.path().to_ascii_lowercase();
    if ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }
    if let Some(mime) = &record.response_mime {
        let mime = mime.to_ascii_lowercase();
        return mime.starts_with("image/")
            || mime.starts_with("font/")
            || mime.contains("javascript")
            || mime.contains("css");
    }
    false
}

fn build_target_prompt(action: &str, candidates: &[&TrafficRecord]) -> String {
    let mut listing = String::new();
    for record in candidates {
        let _ = writeln!(
            listing,
            "{}: {} {} (status {})",
            record.id, record.method, record.url, record.status
        );
    }
    format!(
        r#"A browser session was captured while a user performed this action:

{action}

## Captured requests

{listing}
## Instructions

Pick the single request that directly performs the action: the API call
whose response carries the data or result the user was after. Not a page
load, not a prefetch, not telemetry.

Respond with JSON (no markdown fences):
{{"record": "r12", "reason": "why this request"}}
"#
    )
}

fn parse_target_response(text: &str) -> RetraceResult<(RecordId, Option<String>)> {
    let value: serde_json::Value = serde_json::from_str(response_json_text(text))
        .map_err(|err| RetraceError::matcher(format!("target selection returned invalid JSON: {err}")))?;

    let label = value
        .get("record")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| RetraceError::matcher("missing 'record' field in target selection"))?;
    let record = RecordId::from_label(label.trim()).ok_or_else(|| {
        RetraceError::matcher(format!("{label:?} is not a record label"))
    })?;

    let reason = value
        .get("reason")
        .and_then(serde_json::Value::as_str)
        .map(String::from);
    Ok((record, reason))
}
