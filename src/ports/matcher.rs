//! Semantic matcher port: the oracle that decides whether a captured
//! response produced a given value.
//!
//! The resolver treats this as an external collaborator. Backends range from
//! plain substring containment to an LLM call; the resolver never knows
//! which one it is talking to.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::traffic::TrafficRecord;

/// Boxed future type alias used by [`SemanticMatcher`] to keep the trait
/// dyn-compatible.
pub type MatchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<MatchVerdict, Box<dyn Error + Send + Sync>>> + Send + 'a>>;

/// One question for a matcher: could this candidate's response have
/// produced this value?
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery<'a> {
    /// What the user is trying to accomplish, for backends that can use
    /// context.
    pub action: &'a str,
    /// The fragment value a producer is being sought for.
    pub value: &'a str,
    /// The candidate producer.
    pub candidate: &'a TrafficRecord,
}

/// A matcher's answer for one (value, candidate) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchVerdict {
    /// Whether the candidate's response produced the value.
    pub matched: bool,
    /// Where in the response the value sits, when the backend can tell
    /// (a JSON pointer or a byte offset).
    pub location: Option<String>,
}

impl MatchVerdict {
    /// A negative verdict.
    #[must_use]
    pub fn miss() -> Self {
        Self {
            matched: false,
            location: None,
        }
    }

    /// A positive verdict with an optional location.
    #[must_use]
    pub fn hit(location: Option<String>) -> Self {
        Self {
            matched: true,
            location,
        }
    }
}

/// Decides whether captured responses produced fragment values.
///
/// Implementations must consume the query synchronously (clone what they
/// need) so the returned future only borrows `self`.
pub trait SemanticMatcher: Send + Sync {
    /// Assesses one (value, candidate) pair.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend fails (network, malformed backend
    /// output). The resolver treats errors and timeouts as inconclusive,
    /// retrying once on a later level.
    fn assess(&self, query: &MatchQuery<'_>) -> MatchFuture<'_>;
}

impl<M: SemanticMatcher + ?Sized> SemanticMatcher for std::sync::Arc<M> {
    fn assess(&self, query: &MatchQuery<'_>) -> MatchFuture<'_> {
        (**self).assess(query)
    }
}
