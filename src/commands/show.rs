//! `retrace show` command.

use crate::assemble::RequestPlan;
use crate::cli::ShowArgs;
use crate::{render, RetraceResult};

/// Execute the `show` command.
///
/// Reloads a saved plan document and re-renders the dependency tree and
/// replay listing.
///
/// # Errors
///
/// Returns an error string if the document cannot be read or parsed.
pub fn run(args: &ShowArgs) -> Result<(), String> {
    run_inner(args).map_err(|err| err.to_string())
}

fn run_inner(args: &ShowArgs) -> RetraceResult<()> {
    let text = std::fs::read_to_string(&args.plan)?;
    let plan = RequestPlan::from_yaml_str(&text)?;

    println!("Plan: {}", plan.id);
    println!("Capture: {}", plan.capture);
    println!("Action: {}", plan.action);
    println!("State: {} ({} levels)", plan.state, plan.levels);
    println!();
    print!("{}", render::report(&plan));
    Ok(())
}
