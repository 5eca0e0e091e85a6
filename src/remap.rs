//! Palette remapping: rewrite a resolved chunk's pixels in place.

use crate::color::{self, Color, TRANSPARENT};
use crate::palette::{is_transparent_placeholder, ColorMappingTable, DefaultMapping, IgnoreSet};
use crate::request::PixelChunk;
use std::collections::HashMap;

/// Placeholder to final color lookup for one resolved group.
pub type Substitutions = HashMap<Color, Color>;

/// Build the substitution table for `group`.
///
/// Ignored colors are left out even when the table maps them, so they pass
/// through unchanged.
///
/// With `defaults`, each placeholder takes the default color for its subtype
/// when one is given, which lets a caller swap a whole role to a new color
/// without knowing which group was resolved.
pub fn build_substitutions(
    mappings: &ColorMappingTable,
    ignore: &IgnoreSet,
    group: usize,
    defaults: Option<&DefaultMapping>,
) -> Substitutions {
    mappings
        .iter()
        .filter(|(placeholder, _)| !ignore.contains(*placeholder))
        .filter_map(|(placeholder, by_group)| {
            let target = by_group.get(&group)?;
            let color = defaults.and_then(|d| d.get(target.subtype)).unwrap_or(target.color);
            Some((*placeholder, color))
        })
        .collect()
}

/// Rewrite every pixel of the chunk.
///
/// Transparent pixels become [`TRANSPARENT`] (clearing stray RGB left under
/// zero alpha), mapped placeholders are substituted, and everything else
/// passes through unchanged.
pub fn remap_chunk(chunk: &mut PixelChunk, substitutions: &Substitutions) {
    for pixel in chunk.pixels_mut() {
        *pixel = remap_pixel(*pixel, substitutions);
    }
}

fn remap_pixel(pixel: Color, substitutions: &Substitutions) -> Color {
    if color::is_transparent(pixel) {
        return TRANSPARENT;
    }
    if let Some(target) = substitutions.get(&pixel) {
        return *target;
    }
    if is_transparent_placeholder(pixel) {
        return TRANSPARENT;
    }
    pixel
}
