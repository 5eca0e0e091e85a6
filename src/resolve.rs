//! Color group resolution
//!
//! Scans a chunk against the request's mapping table and narrows the
//! eligible groups to those consistent with every color present. Authoring
//! mistakes (colors no group maps, or colors that no single group maps
//! together) are reported with the offending color and its position in the
//! source sheet.

use crate::color::{self, to_hex, Color};
use crate::palette::is_transparent_placeholder;
use crate::raster::{Point, Rect, Size};
use crate::request::{PixelChunk, RegionError, SpritePaletteRequest, UnmappedPolicy};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Outcome of resolving one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The chunk uses mapped colors and resolves to this group index
    Group(usize),
    /// Every color is transparent or ignored; no remapping is needed
    Passthrough,
}

/// Error while baking a sprite.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BakeError {
    /// The chunk's colors rule out every eligible group
    #[error("no color group matches all of [{}]; contradiction at pixel {at}", hex_list(.colors))]
    NoMatchingColorGroups { colors: Vec<Color>, at: Point },
    /// A color that is not mapped, ignored, or transparent
    #[error("unspecified color {} at pixel {at}", hex_list(std::slice::from_ref(.color)))]
    UnspecifiedColor { color: Color, at: Point },
    /// A preloaded cache was replayed with more requests than it recorded.
    ///
    /// This means the request sequence differs from the one the cache was
    /// built with and must be treated as fatal.
    #[error(
        "preloaded cache mismatch: slot {slot} requested for {size} sprites but only {preloaded} were recorded"
    )]
    PreloadOverrun { size: Size, slot: usize, preloaded: usize },
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("no baked sprite at page {page} {rect} of the {size} bucket")]
    UnknownHandle { size: Size, page: usize, rect: Rect },
    #[error("repalette request is {found} but the baked sprite is {expected}")]
    SizeMismatch { expected: Size, found: Size },
}

impl BakeError {
    /// True for errors caused by the source art rather than the caller.
    pub fn is_authoring_error(&self) -> bool {
        matches!(self, BakeError::NoMatchingColorGroups { .. } | BakeError::UnspecifiedColor { .. })
    }

    /// True for errors that mean the cache and request sequence disagree.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BakeError::PreloadOverrun { .. })
    }
}

fn hex_list(colors: &[Color]) -> String {
    colors.iter().map(|c| to_hex(*c)).collect::<Vec<_>>().join(", ")
}

/// Resolve the color group for one chunk.
///
/// Parametric pixels in `chunk` are rewritten to their canonical placeholder
/// form as they are scanned. Among the groups that survive, the lowest index
/// wins.
pub fn resolve_chunk(
    request: &SpritePaletteRequest<'_>,
    chunk: &mut PixelChunk,
) -> Result<Resolution, BakeError> {
    let mut possible: BTreeSet<usize> = request.groups.iter().copied().collect();
    let mut seen: HashSet<Color> = HashSet::new();
    let mut scanned: Vec<Color> = Vec::new();
    let mut transparent_only = true;

    for index in 0..chunk.pixels().len() {
        let mut pixel = chunk.pixels()[index];
        if color::is_parametric(pixel) {
            pixel = color::canonical_parametric(pixel);
            chunk.pixels_mut()[index] = pixel;
        }

        // Repeated colors always reach the same verdict
        if !seen.insert(pixel) {
            continue;
        }
        scanned.push(pixel);

        if request.ignore.contains(&pixel) {
            continue;
        }

        if let Some(by_group) = request.mappings.get(&pixel) {
            transparent_only = false;
            possible.retain(|group| by_group.contains_key(group));
            if possible.is_empty() {
                return Err(BakeError::NoMatchingColorGroups {
                    colors: scanned,
                    at: chunk.coordinate(index),
                });
            }
        } else if color::is_transparent(pixel) || is_transparent_placeholder(pixel) {
            continue;
        } else if request.policy == UnmappedPolicy::AllowTranslucent
            && color::is_translucent(pixel)
        {
            continue;
        } else {
            return Err(BakeError::UnspecifiedColor { color: pixel, at: chunk.coordinate(index) });
        }
    }

    if transparent_only {
        return Ok(Resolution::Passthrough);
    }

    // Non-empty: a mapped color was seen and every narrowing left a survivor
    match possible.first() {
        Some(group) => Ok(Resolution::Group(*group)),
        None => Err(BakeError::NoMatchingColorGroups {
            colors: scanned,
            at: chunk.rect.origin(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{ColorMappingTable, IgnoreSet, Subtype};
    use image::{Rgba, RgbaImage};

    const RED: Color = Rgba([255, 0, 0, 255]);
    const BLACK: Color = Rgba([0, 0, 0, 255]);
    const GREEN: Color = Rgba([0, 255, 0, 255]);
    const WHITE: Color = Rgba([255, 255, 255, 255]);
    const PINK: Color = Rgba([255, 128, 192, 255]);
    const BLUE: Color = Rgba([0, 0, 255, 255]);
    const DARK_GRAY: Color = Rgba([64, 64, 64, 255]);

    /// red maps under groups 0 and 1, black under 0 and 1, green only under 2
    fn mappings() -> ColorMappingTable {
        ColorMappingTable::new()
            .with(RED, 0, Subtype::Other, PINK)
            .with(RED, 1, Subtype::Other, BLUE)
            .with(BLACK, 0, Subtype::Black, BLACK)
            .with(BLACK, 1, Subtype::Black, DARK_GRAY)
            .with(GREEN, 2, Subtype::Other, WHITE)
    }

    fn filled(width: u32, height: u32, color: Color) -> RgbaImage {
        RgbaImage::from_pixel(width, height, color)
    }

    fn resolve(
        image: &RgbaImage,
        mappings: &ColorMappingTable,
        ignore: &IgnoreSet,
        policy: UnmappedPolicy,
    ) -> Result<Resolution, BakeError> {
        let rect = Rect::new(0, 0, image.width(), image.height());
        let request = SpritePaletteRequest::new(image, rect, mappings, ignore).with_policy(policy);
        let mut chunk = PixelChunk::read(image, rect);
        resolve_chunk(&request, &mut chunk)
    }

    #[test]
    fn test_lowest_group_wins() {
        let mut image = filled(16, 16, RED);
        image.put_pixel(3, 7, BLACK);
        let table = mappings();
        let result = resolve(&image, &table, &IgnoreSet::new(), UnmappedPolicy::Strict);
        assert_eq!(result, Ok(Resolution::Group(0)));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let mut image = filled(8, 8, BLACK);
        image.put_pixel(0, 0, RED);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let first = resolve(&image, &table, &ignore, UnmappedPolicy::Strict);
        let second = resolve(&image, &table, &ignore, UnmappedPolicy::Strict);
        assert_eq!(first, second);
    }

    #[test]
    fn test_eligible_groups_restrict_result() {
        let image = filled(4, 4, RED);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let rect = Rect::new(0, 0, 4, 4);
        let mut request = SpritePaletteRequest::new(&image, rect, &table, &ignore);
        request.groups = vec![1, 2];

        let mut chunk = PixelChunk::read(&image, rect);
        assert_eq!(resolve_chunk(&request, &mut chunk), Ok(Resolution::Group(1)));
    }

    #[test]
    fn test_contradicting_colors_are_rejected() {
        let mut image = filled(4, 4, RED);
        image.put_pixel(2, 1, GREEN);
        let table = mappings();
        let result = resolve(&image, &table, &IgnoreSet::new(), UnmappedPolicy::Strict);

        assert_eq!(
            result,
            Err(BakeError::NoMatchingColorGroups { colors: vec![RED, GREEN], at: Point::new(2, 1) })
        );
    }

    #[test]
    fn test_unknown_color_is_rejected() {
        let mut image = filled(4, 4, RED);
        image.put_pixel(1, 3, Rgba([12, 34, 56, 255]));
        let table = mappings();
        let result = resolve(&image, &table, &IgnoreSet::new(), UnmappedPolicy::Strict);

        assert_eq!(
            result,
            Err(BakeError::UnspecifiedColor {
                color: Rgba([12, 34, 56, 255]),
                at: Point::new(1, 3)
            })
        );
    }

    #[test]
    fn test_error_coordinates_are_in_source_space() {
        let mut image = filled(32, 32, RED);
        image.put_pixel(20, 9, WHITE);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let rect = Rect::new(16, 8, 16, 16);
        let request = SpritePaletteRequest::new(&image, rect, &table, &ignore);

        let mut chunk = PixelChunk::read(&image, rect);
        let err = resolve_chunk(&request, &mut chunk).unwrap_err();
        assert_eq!(err, BakeError::UnspecifiedColor { color: WHITE, at: Point::new(20, 9) });
        assert!(err.to_string().contains("#FFFFFFFF"));
        assert!(err.to_string().contains("(20, 9)"));
    }

    #[test]
    fn test_transparent_and_ignored_chunk_passes_through() {
        let mut image = filled(4, 4, Rgba([9, 9, 9, 0]));
        image.put_pixel(0, 0, WHITE);
        let table = mappings();
        let ignore: IgnoreSet = [WHITE].into_iter().collect();
        let result = resolve(&image, &table, &ignore, UnmappedPolicy::Strict);
        assert_eq!(result, Ok(Resolution::Passthrough));
    }

    #[test]
    fn test_ignored_colors_do_not_narrow_groups() {
        let mut image = filled(4, 4, GREEN);
        image.put_pixel(0, 0, RED);
        let table = mappings();
        // Red is both mapped and ignored; ignoring takes precedence
        let ignore: IgnoreSet = [RED].into_iter().collect();
        let result = resolve(&image, &table, &ignore, UnmappedPolicy::Strict);
        assert_eq!(result, Ok(Resolution::Group(2)));
    }

    #[test]
    fn test_translucent_colors_depend_on_policy() {
        let mut image = filled(4, 4, RED);
        image.put_pixel(1, 1, Rgba([255, 0, 0, 128]));
        let table = mappings();
        let ignore = IgnoreSet::new();

        assert!(matches!(
            resolve(&image, &table, &ignore, UnmappedPolicy::Strict),
            Err(BakeError::UnspecifiedColor { .. })
        ));
        assert_eq!(
            resolve(&image, &table, &ignore, UnmappedPolicy::AllowTranslucent),
            Ok(Resolution::Group(0))
        );
    }

    #[test]
    fn test_parametric_pixels_are_canonicalized() {
        let placeholder = Subtype::Other.placeholder();
        let table = ColorMappingTable::new().with(placeholder, 4, Subtype::Other, BLUE);
        let image = filled(2, 2, Rgba([2, 200, 100, color::PARAMETRIC_ALPHA]));
        let ignore = IgnoreSet::new();
        let rect = Rect::new(0, 0, 2, 2);
        let request = SpritePaletteRequest::new(&image, rect, &table, &ignore);

        let mut chunk = PixelChunk::read(&image, rect);
        assert_eq!(resolve_chunk(&request, &mut chunk), Ok(Resolution::Group(4)));
        assert!(chunk.pixels().iter().all(|p| *p == placeholder));
    }

    #[test]
    fn test_unmapped_transparent_placeholder_is_allowed() {
        let image = filled(2, 2, Subtype::Transparent.placeholder());
        let table = mappings();
        let result = resolve(&image, &table, &IgnoreSet::new(), UnmappedPolicy::Strict);
        assert_eq!(result, Ok(Resolution::Passthrough));
    }

    #[test]
    fn test_no_eligible_groups_rejects_mapped_color() {
        let image = filled(2, 2, RED);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let rect = Rect::new(0, 0, 2, 2);
        let mut request = SpritePaletteRequest::new(&image, rect, &table, &ignore);
        request.groups.clear();

        let mut chunk = PixelChunk::read(&image, rect);
        assert!(matches!(
            resolve_chunk(&request, &mut chunk),
            Err(BakeError::NoMatchingColorGroups { .. })
        ));
    }

    #[test]
    fn test_error_classification() {
        let authoring = BakeError::UnspecifiedColor { color: RED, at: Point::default() };
        let fatal = BakeError::PreloadOverrun { size: Size::new(16, 16), slot: 3, preloaded: 3 };
        assert!(authoring.is_authoring_error());
        assert!(!authoring.is_fatal());
        assert!(fatal.is_fatal());
    }
}
