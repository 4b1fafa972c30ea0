//! Persistent match-verdict cache.
//!
//! Matcher verdicts are pure functions of (fragment value, candidate
//! record) for a given backend, so they can be kept across runs. The cache
//! is an explicit YAML document loaded and saved by the caller; nothing in
//! the resolution core memoizes on its own. Delete the file or pass a fresh
//! store to invalidate.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::matcher::MatchVerdict;
use crate::traffic::RecordId;
use crate::RetraceResult;

/// On-disk form of the cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerdictDocument {
    /// Which backend produced these verdicts (e.g. `llm:claude-sonnet-4-20250514`).
    pub matcher: String,
    /// When the document was last written.
    pub recorded_at: DateTime<Utc>,
    /// The cached verdicts.
    pub entries: Vec<VerdictEntry>,
}

/// One cached verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerdictEntry {
    /// The fragment value that was searched for.
    pub value: String,
    /// Record label of the candidate producer (`r0`, `r1`, ...).
    pub record: String,
    /// Whether the candidate's response produced the value.
    pub matched: bool,
    /// Location reported by the backend, when any.
    pub location: Option<String>,
}

/// In-memory verdict cache keyed by (fragment value, record id).
#[derive(Debug, Clone)]
pub struct VerdictStore {
    matcher_tag: String,
    entries: HashMap<(String, RecordId), MatchVerdict>,
}

impl VerdictStore {
    /// An empty store for the given backend tag.
    #[must_use]
    pub fn new(matcher_tag: impl Into<String>) -> Self {
        Self {
            matcher_tag: matcher_tag.into(),
            entries: HashMap::new(),
        }
    }

    /// Loads a store from disk.
    ///
    /// A missing file yields an empty store. A document written by a
    /// different backend is discarded (with a diagnostic) rather than
    /// served: verdicts are only valid for the backend that produced them.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &Path, matcher_tag: &str) -> RetraceResult<Self> {
        if !path.exists() {
            return Ok(Self::new(matcher_tag));
        }
        let text = std::fs::read_to_string(path)?;
        let document: VerdictDocument = serde_yaml::from_str(&text)?;
        if document.matcher != matcher_tag {
            tracing::warn!(
                "ignoring verdict cache {} (backend {} != {matcher_tag})",
                path.display(),
                document.matcher
            );
            return Ok(Self::new(matcher_tag));
        }

        let mut store = Self::new(matcher_tag);
        for entry in document.entries {
            let Some(record) = RecordId::from_label(&entry.record) else {
                tracing::warn!("ignoring verdict with bad record label {:?}", entry.record);
                continue;
            };
            store.entries.insert(
                (entry.value, record),
                MatchVerdict {
                    matched: entry.matched,
                    location: entry.location,
                },
            );
        }
        Ok(store)
    }

    /// Writes the store to disk, sorted for stable diffs.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the write fails.
    pub fn save(&self, path: &Path) -> RetraceResult<()> {
        let mut entries: Vec<VerdictEntry> = self
            .entries
            .iter()
            .map(|((value, record), verdict)| VerdictEntry {
                value: value.clone(),
                record: record.to_string(),
                matched: verdict.matched,
                location: verdict.location.clone(),
            })
            .collect();
        entries.sort_by(|a, b| (&a.value, &a.record).cmp(&(&b.value, &b.record)));

        let document = VerdictDocument {
            matcher: self.matcher_tag.clone(),
            recorded_at: Utc::now(),
            entries,
        };
        let yaml = serde_yaml::to_string(&document)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Looks up a cached verdict.
    #[must_use]
    pub fn get(&self, value: &str, record: RecordId) -> Option<&MatchVerdict> {
        self.entries.get(&(value.to_string(), record))
    }

    /// Caches one verdict.
    pub fn put(&mut self, value: String, record: RecordId, verdict: MatchVerdict) {
        self.entries.insert((value, record), verdict);
    }

    /// Number of cached verdicts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The backend tag this store is valid for.
    #[must_use]
    pub fn matcher_tag(&self) -> &str {
        &self.matcher_tag
    }
}
