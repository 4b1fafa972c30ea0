//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::resolve::{
    DEFAULT_CONCURRENCY, DEFAULT_MATCH_TIMEOUT_SECS, DEFAULT_MAX_STEPS, DEFAULT_MIN_FRAGMENT_LEN,
};

/// Model used for target selection and the LLM matcher unless overridden.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Top-level CLI parser for `retrace`.
#[derive(Debug, Parser)]
#[command(
    name = "retrace",
    version,
    about = "Reverse-engineer API call chains from captured browser sessions"
)]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve the dependency graph behind one captured action.
    Resolve(ResolveArgs),
    /// List the requests in a capture.
    Records(RecordsArgs),
    /// Re-render a saved plan document.
    Show(ShowArgs),
}

/// Arguments for `retrace resolve`.
#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Path of the HAR capture to analyze.
    #[arg(long)]
    pub har: PathBuf,

    /// What the user did in the captured session.
    #[arg(long)]
    pub prompt: String,

    /// Pick the target by URL substring instead of asking the model.
    /// The latest matching request wins.
    #[arg(long)]
    pub target: Option<String>,

    /// Model id for target selection and the `llm` matcher.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Maximum resolution levels before the graph is truncated.
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    pub max_steps: usize,

    /// Concurrent matcher calls within a level.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-call matcher timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_MATCH_TIMEOUT_SECS)]
    pub match_timeout_secs: u64,

    /// Fragments shorter than this are never searched.
    #[arg(long, default_value_t = DEFAULT_MIN_FRAGMENT_LEN)]
    pub min_fragment_len: usize,

    /// Caller-supplied input variable as KEY=VALUE. Repeatable.
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Matcher backend.
    #[arg(long, value_enum, default_value_t = MatcherKind::Llm)]
    pub matcher: MatcherKind,

    /// Verdict cache file, loaded before the run and rewritten after.
    #[arg(long)]
    pub verdicts: Option<PathBuf>,

    /// Ignore cached verdicts; the cache file is rebuilt from this run.
    #[arg(long)]
    pub refresh_verdicts: bool,

    /// Also write the plan document (YAML) to this path.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// What to print on stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Tree)]
    pub format: OutputFormat,
}

/// Matcher backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatcherKind {
    /// Model-backed semantic matching.
    Llm,
    /// Substring containment, no model involved.
    Exact,
}

/// Output format for `retrace resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Dependency tree plus replay listing.
    Tree,
    /// The plan document as YAML.
    Yaml,
    /// The plan document as JSON.
    Json,
}

/// Arguments for `retrace records`.
#[derive(Debug, Args)]
pub struct RecordsArgs {
    /// Path of the HAR capture to list.
    #[arg(long)]
    pub har: PathBuf,

    /// Only list records whose URL contains this substring.
    #[arg(long)]
    pub filter: Option<String>,
}

/// Arguments for `retrace show`.
#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Path of a saved plan document.
    pub plan: PathBuf,
}
