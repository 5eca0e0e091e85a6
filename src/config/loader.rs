//! Configuration loading and discovery for `palbake.toml`
//!
//! Provides functions to find and load configuration, and to turn it into
//! database settings.

use super::schema::{CacheConfig, DefinitionsConfig, PalbakeConfig, ProjectConfig};
use crate::database::DatabaseSettings;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "palbake.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse palbake.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// A loaded configuration and the directory its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PalbakeConfig,
    pub root: PathBuf,
}

impl LoadedConfig {
    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(&self.root, path)
    }

    pub fn content_dir(&self) -> PathBuf {
        self.resolve(&self.config.project.content)
    }

    pub fn definitions_file(&self) -> PathBuf {
        self.resolve(&self.config.definitions.file)
    }

    /// Settings for a [`PalettedSpriteDatabase`](crate::database::PalettedSpriteDatabase).
    pub fn database_settings(&self) -> DatabaseSettings {
        DatabaseSettings {
            cache_file: self.resolve(&self.config.cache.file),
            content_dir: self.content_dir(),
            checksum_roots: self.config.cache.checksum_roots.clone(),
            max_page_size: self.config.cache.max_page_size,
        }
    }
}

/// Find palbake.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    let cwd = env::current_dir().ok()?;
    find_config_from(cwd)
}

/// Find palbake.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration.
///
/// If a path is provided, loads from that file. Otherwise uses
/// [`find_config`], falling back to [`default_config`] rooted at the current
/// directory when nothing is found.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => {
            let config = load_config_file(&p)?;
            let root = project_root(&p).map(Path::to_path_buf).unwrap_or_default();
            log::debug!("loaded {} (project root {})", p.display(), root.display());
            Ok(LoadedConfig { config, root })
        }
        None => {
            log::debug!("no {} found, using defaults", CONFIG_FILE_NAME);
            Ok(LoadedConfig { config: default_config(), root: env::current_dir()? })
        }
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<PalbakeConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: PalbakeConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Default configuration, named after the current directory.
pub fn default_config() -> PalbakeConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    PalbakeConfig {
        project: ProjectConfig { name: project_name, content: PathBuf::from("content") },
        cache: CacheConfig::default(),
        definitions: DefinitionsConfig::default(),
    }
}

/// Get the project root directory from a config file path.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

/// Resolve a path relative to the project root; absolute paths are unchanged.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
