//! `retrace resolve` command.

use std::time::Duration;

use crate::adapters::{AnthropicClient, CachedMatcher, LlmMatcher, SubstringMatcher};
use crate::cli::{MatcherKind, OutputFormat, ResolveArgs};
use crate::ports::matcher::SemanticMatcher;
use crate::resolve::ResolveConfig;
use crate::traffic::TrafficStore;
use crate::vars::InputVariables;
use crate::verdicts::VerdictStore;
use crate::{assemble, render, target, RetraceError, RetraceResult};

/// Execute the `resolve` command.
///
/// Loads the capture, picks the target, resolves the dependency graph,
/// assembles the plan, and prints it in the requested format.
///
/// # Errors
///
/// Returns an error string when any stage fails.
pub fn run(args: &ResolveArgs) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new().map_err(|err| err.to_string())?;
    runtime.block_on(run_async(args)).map_err(|err| err.to_string())
}

async fn run_async(args: &ResolveArgs) -> RetraceResult<()> {
    let store = TrafficStore::from_har_file(&args.har)?;
    if store.skipped() > 0 {
        tracing::warn!("skipped {} unusable capture entries", store.skipped());
    }
    if store.is_empty() {
        return Err(RetraceError::invalid_input(format!(
            "{} contains no usable requests",
            args.har.display()
        )));
    }
    let vars = InputVariables::parse_pairs(&args.vars)?;
    if !vars.is_empty() {
        let names: Vec<&str> = vars.iter().map(|(name, _)| name).collect();
        tracing::debug!("input variables supplied: {}", names.join(", "));
    }

    let target = match &args.target {
        Some(needle) => target::by_url_substring(&store, needle)?,
        None => {
            let llm = AnthropicClient::new();
            target::by_action(&store, &llm, &args.model, &args.prompt).await?
        }
    };
    tracing::debug!("resolving dependencies of {target}");

    let tag = matcher_tag(args);
    let verdict_store = match &args.verdicts {
        Some(path) if !args.refresh_verdicts => VerdictStore::load(path, &tag)?,
        _ => VerdictStore::new(tag),
    };
    if !verdict_store.is_empty() {
        tracing::debug!(
            "reusing {} cached verdicts for backend {}",
            verdict_store.len(),
            verdict_store.matcher_tag()
        );
    }
    let inner: Box<dyn SemanticMatcher> = match args.matcher {
        MatcherKind::Llm => Box::new(LlmMatcher::new(
            Box::new(AnthropicClient::new()),
            &args.model,
        )),
        MatcherKind::Exact => Box::new(SubstringMatcher::new()),
    };
    let matcher = CachedMatcher::new(inner, verdict_store);

    let config = ResolveConfig {
        action: args.prompt.clone(),
        max_steps: args.max_steps,
        concurrency: args.concurrency,
        match_timeout: Duration::from_secs(args.match_timeout_secs),
        min_fragment_len: args.min_fragment_len,
    };
    let graph = crate::resolve::resolve(&store, target, &matcher, &vars, &config).await?;

    if let Some(path) = &args.verdicts {
        matcher.into_store().save(path)?;
        tracing::debug!("verdict cache written to {}", path.display());
    }

    let plan = assemble::assemble(&store, &graph, &args.har.display().to_string(), &args.prompt)?;

    if let Some(path) = &args.out {
        std::fs::write(path, plan.to_yaml()?)?;
    }
    match args.format {
        OutputFormat::Tree => print!("{}", render::report(&plan)),
        OutputFormat::Yaml => print!("{}", plan.to_yaml()?),
        OutputFormat::Json => println!("{}", plan.to_json()?),
    }
    Ok(())
}

fn matcher_tag(args: &ResolveArgs) -> String {
    match args.matcher {
        MatcherKind::Llm => format!("llm:{}", args.model),
        MatcherKind::Exact => "exact".to_string(),
    }
}
