//! Caching wrapper for any matcher backend.
//!
//! Serves verdicts from a [`VerdictStore`] and records fresh ones into it.
//! Backend errors are never cached: an inconclusive call must stay
//! retryable. The wrapped store is handed back via
//! [`CachedMatcher::into_store`] so the caller decides what gets persisted.

use std::sync::Mutex;

use crate::ports::matcher::{MatchFuture, MatchQuery, MatchVerdict, SemanticMatcher};
use crate::verdicts::VerdictStore;

/// Matcher that consults a verdict store before its inner backend.
pub struct CachedMatcher {
    inner: Box<dyn SemanticMatcher>,
    store: Mutex<VerdictStore>,
}

impl CachedMatcher {
    /// Wraps a backend with a (possibly preloaded) verdict store.
    #[must_use]
    pub fn new(inner: Box<dyn SemanticMatcher>, store: VerdictStore) -> Self {
        Self {
            inner,
            store: Mutex::new(store),
        }
    }

    /// Unwraps the verdict store, including everything recorded during use.
    #[must_use]
    pub fn into_store(self) -> VerdictStore {
        self.store
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SemanticMatcher for CachedMatcher {
    fn assess(&self, query: &MatchQuery<'_>) -> MatchFuture<'_> {
        let value = query.value.to_string();
        let record = query.candidate.id;

        if let Ok(store) = self.store.lock() {
            if let Some(verdict) = store.get(&value, record) {
                let verdict = verdict.clone();
                return Box::pin(async move { Ok(verdict) });
            }
        }

        let pending = self.inner.assess(query);
        Box::pin(async move {
            let verdict: MatchVerdict = pending.await?;
            if let Ok(mut store) = self.store.lock() {
                store.put(value, record, verdict.clone());
            }
            Ok(verdict)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::scripted::ScriptedMatcher;
    use crate::traffic::TrafficStore;

    fn store_with_one_record() -> TrafficStore {
        let text = r#"{
          "log": {
            "entries": [
              {
                "startedDateTime": "2024-03-01T10:00:00.000Z",
                "request": {"method": "GET", "url": "https://api.example.com/a"},
                "response": {"status": 200}
              }
            ]
          }
        }"#;
        TrafficStore::from_har_str(text).expect("parse")
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let traffic = store_with_one_record();
        let record = &traffic.records()[0];
        let scripted = Arc::new(ScriptedMatcher::new().accept("123", record.id, Some("/id")));
        let cached = CachedMatcher::new(
            Box::new(Arc::clone(&scripted)),
            VerdictStore::new("scripted"),
        );

        let query = MatchQuery {
            action: "test",
            value: "123",
            candidate: record,
        };
        let first = cached.assess(&query).await.unwrap();
        let second = cached.assess(&query).await.unwrap();

        assert_eq!(first, second);
        assert!(first.matched);
        assert_eq!(scripted.call_count(), 1);

        let store = cached.into_store();
        assert_eq!(store.len(), 1);
        assert!(store.get("123", record.id).is_some());
    }

    #[tokio::test]
    async fn backend_errors_are_not_cached() {
        let traffic = store_with_one_record();
        let record = &traffic.records()[0];
        let scripted = Arc::new(
            ScriptedMatcher::new()
                .accept("tok", record.id, None)
                .fail_times("tok", record.id, 1),
        );
        let cached = CachedMatcher::new(
            Box::new(Arc::clone(&scripted)),
            VerdictStore::new("scripted"),
        );

        let query = MatchQuery {
            action: "test",
            value: "tok",
            candidate: record,
        };
        assert!(cached.assess(&query).await.is_err());
        let verdict = cached.assess(&query).await.unwrap();
        assert!(verdict.matched);
        assert_eq!(scripted.call_count(), 2);
    }
}
