//! palbake - Command-line tool for baking palette-remapped sprite atlases

use std::process::ExitCode;

use palbake::cli;

fn main() -> ExitCode {
    cli::run()
}
