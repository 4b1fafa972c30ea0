//! Binary entrypoint for the `retrace` CLI.

use std::process::ExitCode;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Log level comes from RUST_LOG (e.g. RUST_LOG=retrace=debug). Logs go
    // to stderr so stdout stays clean for plan output.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match retrace::run(std::env::args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
