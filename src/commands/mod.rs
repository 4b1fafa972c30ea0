//! Command dispatch and handlers.

pub mod records;
pub mod resolve;
pub mod show;

use crate::cli::Command;

/// Dispatch a parsed command to its handler.
///
/// # Errors
///
/// Returns an error string if the selected command handler fails.
pub fn dispatch(command: &Command) -> Result<(), String> {
    match command {
        Command::Resolve(args) => resolve::run(args),
        Command::Records(args) => records::run(args),
        Command::Show(args) => show::run(args),
    }
}
