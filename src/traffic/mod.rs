//! Captured HTTP traffic: the immutable record pool every other component
//! reads from.
//!
//! Records are loaded once (currently from HAR captures), ordered by capture
//! timestamp, and never mutated afterwards. Components refer to records by
//! [`RecordId`] and borrow the data through [`TrafficStore`].

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

mod har;

pub(crate) use har::percent_decode;

/// Stable identifier of a record within one loaded capture.
///
/// Ids are assigned in capture order (`r0`, `r1`, ...) after sorting by
/// timestamp, so they are deterministic across runs over the same file. That
/// makes them safe to use as match-verdict cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub usize);

impl RecordId {
    /// Parses a display label such as `r12` back into an id.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        label.strip_prefix('r')?.parse().ok().map(Self)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// One captured request/response exchange.
#[derive(Debug, Clone)]
pub struct TrafficRecord {
    /// Identifier within the owning store.
    pub id: RecordId,
    /// HTTP method, uppercased as captured.
    pub method: String,
    /// Full request URL.
    pub url: String,
    /// Request headers in capture order.
    pub request_headers: Vec<(String, String)>,
    /// Decoded query parameters in capture order.
    pub query: Vec<(String, String)>,
    /// Raw request body, when one was captured.
    pub request_body: Option<String>,
    /// MIME type of the request body.
    pub request_mime: Option<String>,
    /// Response status code (0 for aborted exchanges).
    pub status: u16,
    /// Response headers in capture order.
    pub response_headers: Vec<(String, String)>,
    /// Raw response body, when one was captured and decodable as text.
    pub response_body: Option<String>,
    /// MIME type of the response body.
    pub response_mime: Option<String>,
    /// Capture timestamp; the causality constraint compares these.
    pub started_at: DateTime<Utc>,
}

impl TrafficRecord {
    /// The path portion of the URL, without scheme, host, query or fragment.
    #[must_use]
    pub fn path(&self) -> &str {
        let after_scheme = match self.url.find("://") {
            Some(idx) => &self.url[idx + 3..],
            None => self.url.as_str(),
        };
        let path_start = after_scheme.find('/').unwrap_or(after_scheme.len());
        let path = &after_scheme[path_start..];
        let path_end = path.find(['?', '#']).unwrap_or(path.len());
        &path[..path_end]
    }

    /// Case-insensitive request header lookup.
    #[must_use]
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Case-insensitive response header lookup.
    #[must_use]
    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The request body parsed as JSON, when the MIME type or shape says so.
    #[must_use]
    pub fn request_json(&self) -> Option<serde_json::Value> {
        parse_json_body(self.request_body.as_deref(), self.request_mime.as_deref())
    }

    /// The response body parsed as JSON, when the MIME type or shape says so.
    #[must_use]
    pub fn response_json(&self) -> Option<serde_json::Value> {
        parse_json_body(self.response_body.as_deref(), self.response_mime.as_deref())
    }

    /// Response body length in bytes; disambiguation prefers smaller bodies.
    #[must_use]
    pub fn response_size(&self) -> usize {
        self.response_body.as_ref().map_or(0, String::len)
    }
}

fn parse_json_body(body: Option<&str>, mime: Option<&str>) -> Option<serde_json::Value> {
    let text = body?;
    let looks_like_json = mime.is_some_and(|m| m.contains("json"))
        || matches!(text.trim_start().as_bytes().first(), Some(b'{' | b'['));
    if !looks_like_json {
        return None;
    }
    serde_json::from_str(text).ok()
}

/// The loaded capture: records in timestamp order plus load diagnostics.
#[derive(Debug, Clone)]
pub struct TrafficStore {
    records: Vec<TrafficRecord>,
    skipped: usize,
}

impl TrafficStore {
    /// Builds a store from already-constructed records, sorting them by
    /// capture timestamp and reassigning ids to match the final order.
    #[must_use]
    pub fn new(mut records: Vec<TrafficRecord>) -> Self {
        records.sort_by_key(|record| record.started_at);
        for (index, record) in records.iter_mut().enumerate() {
            record.id = RecordId(index);
        }
        Self {
            records,
            skipped: 0,
        }
    }

    /// Loads a HAR capture from disk.
    ///
    /// Entries that cannot be interpreted are skipped and counted; see
    /// [`TrafficStore::skipped`].
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or is not a HAR
    /// document at the top level.
    pub fn from_har_file(path: &Path) -> crate::RetraceResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            crate::RetraceError::traffic(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_har_str(&text)
    }

    /// Loads a HAR capture from an in-memory document.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not a HAR document at the top level.
    pub fn from_har_str(text: &str) -> crate::RetraceResult<Self> {
        let (records, skipped) = har::parse_records(text)?;
        let mut store = Self::new(records);
        store.skipped = skipped;
        Ok(store)
    }

    /// All records in capture order.
    #[must_use]
    pub fn records(&self) -> &[TrafficRecord] {
        &self.records
    }

    /// Looks up one record.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&TrafficRecord> {
        self.records.get(id.0)
    }

    /// Number of records that survived loading.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records survived loading.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of capture entries dropped during loading.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
