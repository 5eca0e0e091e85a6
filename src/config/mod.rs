//! Configuration module for palbake projects
//!
//! Provides types and parsing for `palbake.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
