//! The dependency resolver: backward chaining from the target request.
//!
//! Level by level, every pending fragment is either short-circuited against
//! the input variables, dropped as too short to search, or assessed against
//! all causally admissible candidate producers. Matcher calls within a
//! level run concurrently under a semaphore; all results for the level are
//! collected before this task mutates the graph, so the graph only ever has
//! one writer.
//!
//! Termination is structural: producers must strictly precede consumers in
//! capture time, records enter the graph at most once, and the level loop
//! is bounded by `max_steps`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::extract::{self, Fragment};
use crate::graph::{DependencyGraph, DiscardedCandidate, FreeReason, GraphState, NodeId, ProducerBinding};
use crate::ports::matcher::{MatchQuery, SemanticMatcher};
use crate::traffic::{RecordId, TrafficRecord, TrafficStore};
use crate::vars::InputVariables;
use crate::{RetraceError, RetraceResult};

/// Default bound on resolution levels.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Default bound on in-flight matcher calls.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default per-call matcher timeout, in seconds.
pub const DEFAULT_MATCH_TIMEOUT_SECS: u64 = 30;

/// Default minimum fragment length worth a matcher search.
pub const DEFAULT_MIN_FRAGMENT_LEN: usize = 3;

/// Tunables for one resolution run.
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Natural-language description of the user action, passed through to
    /// matcher backends that can use context.
    pub action: String,
    /// Maximum number of resolution levels before the graph is truncated.
    pub max_steps: usize,
    /// Maximum number of concurrent matcher calls within a level.
    pub concurrency: usize,
    /// Per-call matcher timeout. A timed-out call is inconclusive, not fatal.
    pub match_timeout: Duration,
    /// Fragments shorter than this never reach the matcher. They can still
    /// bind to input variables; otherwise they surface as free parameters.
    pub min_fragment_len: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            action: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            concurrency: DEFAULT_CONCURRENCY,
            match_timeout: Duration::from_secs(DEFAULT_MATCH_TIMEOUT_SECS),
            min_fragment_len: DEFAULT_MIN_FRAGMENT_LEN,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingFragment {
    node: NodeId,
    fragment: Fragment,
    retried: bool,
}

struct Search<'s> {
    pending_index: usize,
    candidates: Vec<&'s TrafficRecord>,
}

enum Outcome {
    Hit(Option<String>),
    Miss,
    Inconclusive(String),
}

/// Resolves the dependency graph for `target`.
///
/// The returned graph is [`GraphState::Stable`] when every fragment was
/// resolved or exhausted, and [`GraphState::Truncated`] when `max_steps`
/// ran out first. Fragments the budget cut off are surfaced as free
/// parameters rather than silently dropped.
///
/// # Errors
///
/// Returns an error when the target is not part of the capture. Matcher
/// failures and timeouts are absorbed as inconclusive outcomes and never
/// abort resolution.
pub async fn resolve(
    store: &TrafficStore,
    target: RecordId,
    matcher: &dyn SemanticMatcher,
    vars: &InputVariables,
    config: &ResolveConfig,
) -> RetraceResult<DependencyGraph> {
    let target_record = store
        .get(target)
        .ok_or_else(|| RetraceError::invalid_input(format!("target {target} is not in the capture")))?;

    let mut graph = DependencyGraph::new(target);
    let target_node = graph.add_node(target, 0);
    let semaphore = Semaphore::new(config.concurrency.max(1));

    let mut pending: VecDeque<PendingFragment> = extract::fragments(target_record)
        .into_iter()
        .map(|fragment| PendingFragment {
            node: target_node,
            fragment,
            retried: false,
        })
        .collect();

    let mut levels_used = 0;
    for level in 1..=config.max_steps {
        if pending.is_empty() {
            break;
        }
        levels_used = level;
        let current: Vec<PendingFragment> = pending.drain(..).collect();
        tracing::debug!("level {level}: {} fragments to place", current.len());

        // Short circuits first; only what survives goes to the matcher.
        let mut searches: Vec<Search<'_>> = Vec::new();
        for (pending_index, item) in current.iter().enumerate() {
            if let Some(variable) = vars.lookup(&item.fragment.value) {
                graph.add_input_binding(item.node, item.fragment.clone(), variable.to_string());
                continue;
            }
            if item.fragment.value.trim().len() < config.min_fragment_len {
                graph.add_free_parameter(item.node, item.fragment.clone(), FreeReason::BelowMinLength);
                continue;
            }
            let consumer = store.get(item.fragment.record).ok_or_else(|| {
                RetraceError::structural(format!(
                    "fragment owner {} vanished from the store",
                    item.fragment.record
                ))
            })?;
            let candidates: Vec<&TrafficRecord> = store
                .records()
                .iter()
                .filter(|record| record.started_at < consumer.started_at)
                .filter(|record| record.id != consumer.id)
                .filter(|record| !graph.would_cycle(record.id, consumer.id))
                .collect();
            if candidates.is_empty() {
                graph.add_free_parameter(item.node, item.fragment.clone(), FreeReason::NoProducer);
                continue;
            }
            searches.push(Search {
                pending_index,
                candidates,
            });
        }

        // Concurrent assessment, bounded by the semaphore. Nothing below
        // touches the graph until every call in the level has finished.
        let mut keys: Vec<(usize, RecordId)> = Vec::new();
        let mut calls = Vec::new();
        for search in &searches {
            let item = &current[search.pending_index];
            for candidate in &search.candidates {
                keys.push((search.pending_index, candidate.id));
                calls.push(assess_one(
                    matcher,
                    &semaphore,
                    config.match_timeout,
                    &config.action,
                    &item.fragment.value,
                    candidate,
                ));
            }
        }
        let outcomes = futures::future::join_all(calls).await;

        let mut by_search: HashMap<usize, Vec<(RecordId, Outcome)>> = HashMap::new();
        for ((pending_index, record), outcome) in keys.into_iter().zip(outcomes) {
            by_search.entry(pending_index).or_default().push((record, outcome));
        }

        // Apply phase: single writer, deterministic order.
        for search in &searches {
            let item = &current[search.pending_index];
            let results = by_search.remove(&search.pending_index).unwrap_or_default();

            let mut hits: Vec<(RecordId, Option<String>)> = Vec::new();
            let mut inconclusive = false;
            for (record, outcome) in results {
                match outcome {
                    Outcome::Hit(location) => hits.push((record, location)),
                    Outcome::Miss => {}
                    Outcome::Inconclusive(reason) => {
                        inconclusive = true;
                        tracing::warn!(
                            "inconclusive match for {:?} against {record}: {reason}",
                            item.fragment.value
                        );
                    }
                }
            }

            // Edges added earlier in this apply phase may have made a
            // candidate unsafe; re-check before committing.
            let mut discarded: Vec<DiscardedCandidate> = Vec::new();
            hits.retain(|(record, location)| {
                if graph.would_cycle(*record, item.fragment.record) {
                    discarded.push(DiscardedCandidate {
                        record: *record,
                        location: location.clone(),
                    });
                    false
                } else {
                    true
                }
            });

            if hits.is_empty() {
                if !discarded.is_empty() {
                    let dropped: Vec<String> =
                        discarded.iter().map(|d| d.record.to_string()).collect();
                    tracing::debug!(
                        "every hit for {:?} would close a cycle: {}",
                        item.fragment.value,
                        dropped.join(", ")
                    );
                }
                if inconclusive && !item.retried {
                    pending.push_back(PendingFragment {
                        retried: true,
                        ..item.clone()
                    });
                } else if inconclusive {
                    graph.add_free_parameter(item.node, item.fragment.clone(), FreeReason::Inconclusive);
                } else {
                    graph.add_free_parameter(item.node, item.fragment.clone(), FreeReason::NoProducer);
                }
                continue;
            }

            sort_by_preference(store, &mut hits);
            let (winner, location) = hits.remove(0);
            discarded.extend(hits.into_iter().map(|(record, location)| DiscardedCandidate {
                record,
                location,
            }));
            if !discarded.is_empty() {
                let losers: Vec<String> = discarded.iter().map(|d| d.record.to_string()).collect();
                tracing::debug!(
                    "{winner} produces {:?}; discarded {}",
                    item.fragment.value,
                    losers.join(", ")
                );
            }

            let newly_discovered = graph.node_for(winner).is_none();
            let producer_node = graph.add_node(winner, level);
            graph.add_binding(
                item.node,
                ProducerBinding {
                    fragment: item.fragment.clone(),
                    producer: winner,
                    location,
                    discarded,
                },
            );

            if newly_discovered {
                if let Some(producer_record) = store.get(winner) {
                    for fragment in extract::fragments(producer_record) {
                        pending.push_back(PendingFragment {
                            node: producer_node,
                            fragment,
                            retried: false,
                        });
                    }
                }
            }
        }
    }

    let state = if pending.is_empty() {
        GraphState::Stable
    } else {
        tracing::warn!(
            "step budget of {} exhausted with {} fragments unplaced",
            config.max_steps,
            pending.len()
        );
        for item in pending.drain(..) {
            graph.add_free_parameter(item.node, item.fragment, FreeReason::BudgetExhausted);
        }
        GraphState::Truncated
    };
    graph.finish(state, levels_used);
    Ok(graph)
}

/// Disambiguation order: latest preceding capture first, then smallest
/// response body, then earliest capture order.
fn sort_by_preference(store: &TrafficStore, hits: &mut [(RecordId, Option<String>)]) {
    hits.sort_by(|a, b| {
        let (left, right) = (store.get(a.0), store.get(b.0));
        match (left, right) {
            (Some(left), Some(right)) => right
                .started_at
                .cmp(&left.started_at)
                .then_with(|| left.response_size().cmp(&right.response_size()))
                .then_with(|| a.0.cmp(&b.0)),
            _ => a.0.cmp(&b.0),
        }
    });
}

async fn assess_one(
    matcher: &dyn SemanticMatcher,
    semaphore: &Semaphore,
    match_timeout: Duration,
    action: &str,
    value: &str,
    candidate: &TrafficRecord,
) -> Outcome {
    let Ok(_permit) = semaphore.acquire().await else {
        return Outcome::Inconclusive("matcher dispatch closed".into());
    };
    let query = MatchQuery {
        action,
        value,
        candidate,
    };
    match tokio::time::timeout(match_timeout, matcher.assess(&query)).await {
        Ok(Ok(verdict)) if verdict.matched => Outcome::Hit(verdict.location),
        Ok(Ok(_)) => Outcome::Miss,
        Ok(Err(err)) => Outcome::Inconclusive(err.to_string()),
        Err(_) => Outcome::Inconclusive(format!("timed out after {match_timeout:?}")),
    }
}
