//! Core library for the `retrace` CLI: reverse-engineering the API call
//! chain behind a user action from a captured browser session.
//!
//! The pipeline: load a HAR capture into a [`traffic::TrafficStore`], pick
//! the target record ([`target`]), walk backward through the capture
//! binding every dynamic request parameter to the response that produced
//! it ([`resolve`]), then assemble and render the minimal ordered request
//! plan ([`assemble`], [`render`]).

pub mod adapters;
pub mod assemble;
pub mod cli;
pub mod commands;
mod error;
pub mod extract;
pub mod graph;
pub mod ports;
pub mod render;
pub mod resolve;
pub mod target;
pub mod traffic;
pub mod vars;
pub mod verdicts;

pub use error::{RetraceError, RetraceResult};

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(&cli.command)
}
