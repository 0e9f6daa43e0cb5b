//! Binary entrypoint for the `context-manager` command.

use std::process::ExitCode;

use context_manager::start_context_manager;

/// Parse the command line and run the selected command.
fn main() -> ExitCode {
    start_context_manager::run()
}
