//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod checksum;
mod info;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// palbake - Bake palette-remapped sprites into a cached texture atlas
#[derive(Parser)]
#[command(name = "palbake")]
#[command(about = "Bake palette-remapped sprites into a cached texture atlas")]
#[command(version)]
pub struct Cli {
    /// Show debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bake every sprite definition, reusing the cache when it is current
    Build {
        /// Path to palbake.toml (default: search upward from the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Ignore the existing cache and bake everything
        #[arg(short, long)]
        force: bool,
    },

    /// Show the header and buckets of a cache file
    Info {
        /// Cache file to inspect
        cache: PathBuf,
    },

    /// Print the content checksum of a project
    Checksum {
        /// Path to palbake.toml (default: search upward from the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write every atlas page of a cache file as PNG
    Export {
        /// Cache file to read
        cache: PathBuf,

        /// Output directory; pages are written as <w>x<h>_<page>.png
        out_dir: PathBuf,
    },
}

/// Initialize logging for the binary.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Parse arguments and run the requested command.
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_INVALID_ARGS } else { EXIT_SUCCESS };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_logging(cli.verbose);

    match cli.command {
        Commands::Build { config, force } => build::run_build(config.as_deref(), force),
        Commands::Info { cache } => info::run_info(&cache),
        Commands::Checksum { config } => checksum::run_checksum(config.as_deref()),
        Commands::Export { cache, out_dir } => info::run_export(&cache, &out_dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_flags() {
        let cli = Cli::try_parse_from(["palbake", "build", "--force", "-v", "--config", "p.toml"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Build { config, force } => {
                assert!(force);
                assert_eq!(config, Some(PathBuf::from("p.toml")));
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_export_requires_out_dir() {
        assert!(Cli::try_parse_from(["palbake", "export", "cache.bin"]).is_err());
    }
}
