//! palbake - Palette-remapped sprite baking with a persistent atlas cache
//!
//! This library provides functionality to:
//! - Resolve which color group a sprite region belongs to from its placeholder colors
//! - Remap placeholder colors to concrete palette colors
//! - Pack baked sprites into per-size atlas pages
//! - Save the atlas to a checksum-guarded cache and replay it on later runs

pub mod bucket;
pub mod build;
pub mod cache_file;
pub mod checksum;
pub mod cli;
pub mod color;
pub mod config;
pub mod database;
pub mod definitions;
pub mod fs;
pub mod palette;
pub mod raster;
pub mod remap;
pub mod request;
pub mod resolve;

pub use database::{BakedSpriteHandle, DatabaseSettings, DatabaseState, PalettedSpriteDatabase};
pub use palette::{ColorGroup, ColorMappingTable, DefaultMapping, IgnoreSet, Subtype};
pub use request::{SpritePaletteRequest, UnmappedPolicy};
pub use resolve::BakeError;
