//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the resolution core and an
//! external collaborator (the semantic matcher, the language model behind
//! it). Implementations live in `src/adapters/`.

pub mod llm;
pub mod matcher;

pub use llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};
pub use matcher::{MatchFuture, MatchQuery, MatchVerdict, SemanticMatcher};
