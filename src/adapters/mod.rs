//! Adapter implementations of the port traits.
//!
//! Matcher backends: [`SubstringMatcher`] (deterministic containment),
//! [`LlmMatcher`] (model-backed), [`ScriptedMatcher`] (fixed verdict table),
//! and [`CachedMatcher`] (verdict-store wrapper around any of them).
//! [`AnthropicClient`] is the live LLM behind the model-backed pieces.

pub mod anthropic;
pub mod cached;
pub mod llm_matcher;
pub mod scripted;
pub mod substring;

pub use anthropic::AnthropicClient;
pub use cached::CachedMatcher;
pub use llm_matcher::LlmMatcher;
pub use scripted::ScriptedMatcher;
pub use substring::SubstringMatcher;
