//! Lenient HAR ingestion.
//!
//! The top level of the document must parse; individual entries that are
//! malformed or missing load-bearing fields are skipped with a diagnostic so
//! one rotten entry never poisons the capture.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{RecordId, TrafficRecord};
use crate::{RetraceError, RetraceResult};

#[derive(Deserialize)]
struct RawHar {
    log: RawLog,
}

#[derive(Deserialize)]
struct RawLog {
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    started_date_time: String,
    request: RawRequest,
    response: RawResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    method: String,
    url: String,
    #[serde(default)]
    headers: Vec<RawPair>,
    #[serde(default)]
    query_string: Vec<RawPair>,
    post_data: Option<RawPostData>,
}

#[derive(Deserialize)]
struct RawPair {
    name: String,
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPostData {
    mime_type: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    headers: Vec<RawPair>,
    content: Option<RawContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContent {
    mime_type: Option<String>,
    text: Option<String>,
    encoding: Option<String>,
}

/// Parses a HAR document into records with placeholder ids, plus the count
/// of entries that had to be skipped. [`super::TrafficStore::new`] assigns
/// the final ids after sorting.
pub(crate) fn parse_records(text: &str) -> RetraceResult<(Vec<TrafficRecord>, usize)> {
    let raw: RawHar = serde_json::from_str(text)
        .map_err(|err| RetraceError::traffic(format!("not a HAR document: {err}")))?;

    let mut records = Vec::with_capacity(raw.log.entries.len());
    let mut skipped = 0;
    for (index, value) in raw.log.entries.into_iter().enumerate() {
        let entry: RawEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("skipping HAR entry {index}: {err}");
                skipped += 1;
                continue;
            }
        };
        match record_from_entry(entry) {
            Ok(record) => records.push(record),
            Err(reason) => {
                tracing::warn!("skipping HAR entry {index}: {reason}");
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}

fn record_from_entry(entry: RawEntry) -> Result<TrafficRecord, String> {
    let started_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&entry.started_date_time)
        .map_err(|err| format!("bad startedDateTime {:?}: {err}", entry.started_date_time))?
        .with_timezone(&Utc);

    let request = entry.request;
    if request.url.is_empty() {
        return Err("empty request URL".into());
    }

    // Browser exporters ship queryString values already decoded; only when
    // the array is absent do we fall back to decoding the URL ourselves.
    let query = if request.query_string.is_empty() {
        query_pairs_from_url(&request.url)
    } else {
        request
            .query_string
            .into_iter()
            .map(|pair| (pair.name, pair.value))
            .collect()
    };

    let (request_mime, request_body) = match request.post_data {
        Some(post) => (post.mime_type, post.text),
        None => (None, None),
    };

    let response_headers: Vec<(String, String)> = entry
        .response
        .headers
        .into_iter()
        .map(|pair| (pair.name, pair.value))
        .collect();

    let (response_mime, response_body) = match entry.response.content {
        Some(content) => {
            let body = decode_content(content.text, content.encoding.as_deref());
            (content.mime_type, body)
        }
        None => (None, None),
    };
    // Some exporters leave content.mimeType empty; the Content-Type header
    // is the next best source.
    let response_mime = response_mime.filter(|mime| !mime.is_empty()).or_else(|| {
        response_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone())
    });

    Ok(TrafficRecord {
        id: RecordId(0),
        method: request.method,
        url: request.url,
        request_headers: request
            .headers
            .into_iter()
            .map(|pair| (pair.name, pair.value))
            .collect(),
        query,
        request_body,
        request_mime,
        status: entry.response.status,
        response_headers,
        response_body,
        response_mime,
        started_at,
    })
}

fn decode_content(text: Option<String>, encoding: Option<&str>) -> Option<String> {
    let text = text?;
    if encoding != Some("base64") {
        return Some(text);
    }
    match base64::engine::general_purpose::STANDARD.decode(&text) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(decoded) => Some(decoded),
            // binary payload; nothing to match values against
            Err(_) => None,
        },
        Err(err) => {
            tracing::warn!("discarding undecodable base64 response body: {err}");
            None
        }
    }
}

fn query_pairs_from_url(url: &str) -> Vec<(String, String)> {
    let Some(query_start) = url.find('?') else {
        return Vec::new();
    };
    let query = &url[query_start + 1..];
    let query = query.split('#').next().unwrap_or(query);
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((name, value)) => (percent_decode(name), percent_decode(value)),
            None => (percent_decode(part), String::new()),
        })
        .collect()
}

/// Decodes `%XX` escapes and `+`-as-space. Malformed escapes pass through.
pub(crate) fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    out.push(hi * 16 + lo);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
