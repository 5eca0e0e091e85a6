//! Build command implementation

use std::path::Path;
use std::process::ExitCode;

use crate::build::{run_build as build_content, BuildOptions};
use crate::config::load_config;
use crate::database::PalettedSpriteDatabase;
use crate::definitions::SpriteSheet;

use super::{EXIT_ERROR, EXIT_SUCCESS};

/// Run the build command
pub fn run_build(config_path: Option<&Path>, force: bool) -> ExitCode {
    let loaded = match load_config(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let definitions = loaded.definitions_file();
    let sheet = match SpriteSheet::load(&definitions, &loaded.content_dir()) {
        Ok(sheet) => sheet,
        Err(e) => {
            eprintln!("Error: {}: {}", definitions.display(), e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let mut db = PalettedSpriteDatabase::new(loaded.database_settings());
    match build_content(&mut db, &sheet, BuildOptions { force }) {
        Ok(report) => {
            println!("{}: {}", loaded.config.project.name, report.summary());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
