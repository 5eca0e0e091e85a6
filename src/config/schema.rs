//! Configuration schema types for `palbake.toml`
//!
//! Defines the structure and validation rules for a content project.

use crate::database::DEFAULT_MAX_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Content root directory
    #[serde(default = "default_content")]
    pub content: PathBuf,
}

fn default_content() -> PathBuf {
    PathBuf::from("content")
}

/// Cache file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache file path, relative to the project root
    #[serde(default = "default_cache_file")]
    pub file: PathBuf,
    /// Maximum width and height of an atlas page
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// Directories under the content root covered by the checksum
    #[serde(default = "default_checksum_roots")]
    pub checksum_roots: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file: default_cache_file(),
            max_page_size: default_max_page_size(),
            checksum_roots: default_checksum_roots(),
        }
    }
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("build/palettes.cache")
}

fn default_max_page_size() -> u32 {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_checksum_roots() -> Vec<String> {
    vec!["Images".to_string(), "Sprites".to_string()]
}

/// Sprite definitions section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionsConfig {
    /// Definitions file, relative to the project root
    #[serde(default = "default_definitions_file")]
    pub file: PathBuf,
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self { file: default_definitions_file() }
    }
}

fn default_definitions_file() -> PathBuf {
    PathBuf::from("content/Sprites/palettes.json")
}

/// Root configuration structure for palbake.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PalbakeConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub definitions: DefinitionsConfig,
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl PalbakeConfig {
    /// Validate the configuration, collecting every problem found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.cache.max_page_size == 0 {
            errors.push(ConfigValidationError {
                field: "cache.max_page_size".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        if self.cache.checksum_roots.is_empty() {
            errors.push(ConfigValidationError {
                field: "cache.checksum_roots".to_string(),
                message: "must name at least one directory".to_string(),
            });
        }

        for (i, root) in self.cache.checksum_roots.iter().enumerate() {
            if root.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("cache.checksum_roots[{}]", i),
                    message: "must not be empty".to_string(),
                });
            }
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
