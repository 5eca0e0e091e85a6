//! Checksum command implementation

use std::path::Path;
use std::process::ExitCode;

use crate::checksum::content_checksum;
use crate::config::load_config;
use crate::fs::OsFileSystem;

use super::{EXIT_ERROR, EXIT_SUCCESS};

/// Print the content checksum the cache would be stamped with
pub fn run_checksum(config_path: Option<&Path>) -> ExitCode {
    let loaded = match load_config(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let content_dir = loaded.content_dir();
    match content_checksum(&OsFileSystem, &content_dir, &loaded.config.cache.checksum_roots) {
        Ok(checksum) => {
            println!("{:#010x}", checksum);
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}: {}", content_dir.display(), e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
