//! Scripted matcher: answers from a fixed verdict table.
//!
//! This is the deterministic backend used by resolver tests and by
//! programmatic callers that already know the data flow they want to
//! assert. Unscripted pairs get the default verdict, and failures can be
//! injected per pair to exercise the inconclusive-retry path.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ports::matcher::{MatchFuture, MatchQuery, MatchVerdict, SemanticMatcher};
use crate::traffic::RecordId;

type PairKey = (String, RecordId);

/// Matcher backed by an explicit (value, candidate) verdict table.
pub struct ScriptedMatcher {
    verdicts: HashMap<PairKey, MatchVerdict>,
    default: MatchVerdict,
    failures: Mutex<HashMap<PairKey, usize>>,
    calls: Mutex<Vec<PairKey>>,
}

impl ScriptedMatcher {
    /// A matcher that denies everything not explicitly scripted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            verdicts: HashMap::new(),
            default: MatchVerdict::miss(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A matcher that accepts every pair. Useful for termination tests.
    #[must_use]
    pub fn accepting_all() -> Self {
        Self {
            default: MatchVerdict::hit(None),
            ..Self::new()
        }
    }

    /// Scripts a positive verdict for one pair.
    #[must_use]
    pub fn accept(mut self, value: &str, record: RecordId, location: Option<&str>) -> Self {
        self.verdicts.insert(
            (value.to_string(), record),
            MatchVerdict::hit(location.map(String::from)),
        );
        self
    }

    /// Makes the next `times` calls for a pair fail before the table is
    /// consulted.
    #[must_use]
    pub fn fail_times(self, value: &str, record: RecordId, times: usize) -> Self {
        self.failures
            .lock()
            .expect("failure table poisoned")
            .insert((value.to_string(), record), times);
        self
    }

    /// Makes every call for a pair fail.
    #[must_use]
    pub fn fail_always(self, value: &str, record: RecordId) -> Self {
        self.fail_times(value, record, usize::MAX)
    }

    /// Total number of assess calls seen.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("call log poisoned").len()
    }

    /// Number of assess calls seen for one fragment value.
    #[must_use]
    pub fn calls_for(&self, value: &str) -> usize {
        self.calls
            .lock()
            .expect("call log poisoned")
            .iter()
            .filter(|(seen, _)| seen == value)
            .count()
    }
}

impl Default for ScriptedMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticMatcher for ScriptedMatcher {
    fn assess(&self, query: &MatchQuery<'_>) -> MatchFuture<'_> {
        let key = (query.value.to_string(), query.candidate.id);
        self.calls
            .lock()
            .expect("call log poisoned")
            .push(key.clone());

        let mut failures = self.failures.lock().expect("failure table poisoned");
        if let Some(remaining) = failures.get_mut(&key) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                let message = format!("scripted failure for {} at {}", key.0, key.1);
                return Box::pin(async move { Err(message.into()) });
            }
        }
        drop(failures);

        let verdict = self.verdicts.get(&key).unwrap_or(&self.default).clone();
        Box::pin(async move { Ok(verdict) })
    }
}
