//! Bake requests: a source region plus the palette tables that resolve it.

use crate::color::Color;
use crate::palette::{ColorGroup, ColorMappingTable, DefaultMapping, IgnoreSet};
use crate::raster::{self, image_size, Point, Rect, Size};
use image::RgbaImage;

/// How a request treats unmapped, partially transparent colors.
///
/// Tile art is held to [`Strict`](Self::Strict). Entity art is commonly
/// anti-aliased against transparency and uses
/// [`AllowTranslucent`](Self::AllowTranslucent), which lets such colors pass
/// through unchanged instead of failing the bake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmappedPolicy {
    #[default]
    Strict,
    AllowTranslucent,
}

/// One unit of bake work.
#[derive(Debug, Clone)]
pub struct SpritePaletteRequest<'a> {
    pub image: &'a RgbaImage,
    /// Region of `image` holding the sprite
    pub rect: Rect,
    /// Size of independently resolved chunks; the whole rect when `None`
    pub chunk_size: Option<Size>,
    /// Indices of the color groups this sprite may resolve to
    pub groups: Vec<usize>,
    pub mappings: &'a ColorMappingTable,
    pub ignore: &'a IgnoreSet,
    pub defaults: Option<&'a DefaultMapping>,
    pub policy: UnmappedPolicy,
}

impl<'a> SpritePaletteRequest<'a> {
    /// Create a request eligible for every group the mapping table mentions.
    pub fn new(
        image: &'a RgbaImage,
        rect: Rect,
        mappings: &'a ColorMappingTable,
        ignore: &'a IgnoreSet,
    ) -> Self {
        let mut groups: Vec<usize> =
            mappings.iter().flat_map(|(_, by_group)| by_group.keys().copied()).collect();
        groups.sort_unstable();
        groups.dedup();

        Self {
            image,
            rect,
            chunk_size: None,
            groups,
            mappings,
            ignore,
            defaults: None,
            policy: UnmappedPolicy::Strict,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: Size) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_groups(mut self, groups: &[ColorGroup]) -> Self {
        self.groups = groups.iter().map(|group| group.index).collect();
        self
    }

    pub fn with_defaults(mut self, defaults: &'a DefaultMapping) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn with_policy(mut self, policy: UnmappedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pixel size of the sprite, which selects its atlas bucket.
    pub fn size(&self) -> Size {
        self.rect.size()
    }

    fn effective_chunk_size(&self) -> Size {
        self.chunk_size.unwrap_or_else(|| self.size())
    }

    /// Check that the region and chunk size are usable.
    pub fn validate(&self) -> Result<(), RegionError> {
        if self.rect.size().is_empty() {
            return Err(RegionError::Empty(self.rect));
        }
        if !self.rect.fits_within(image_size(self.image)) {
            return Err(RegionError::OutOfBounds { rect: self.rect, image: image_size(self.image) });
        }
        if self.effective_chunk_size().is_empty() {
            return Err(RegionError::EmptyChunk(self.effective_chunk_size()));
        }
        Ok(())
    }

    /// Chunk rectangles in source coordinates, scanned left-to-right then
    /// top-to-bottom. Edge chunks are clipped to the request rectangle.
    pub fn chunks(&self) -> Vec<Rect> {
        let chunk = self.effective_chunk_size();
        let mut rects = Vec::new();
        let mut y = 0;
        while y < self.rect.height {
            let height = chunk.height.min(self.rect.height - y);
            let mut x = 0;
            while x < self.rect.width {
                let width = chunk.width.min(self.rect.width - x);
                rects.push(Rect::new(self.rect.x + x, self.rect.y + y, width, height));
                x += chunk.width;
            }
            y += chunk.height;
        }
        rects
    }
}

/// A request region that cannot be baked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("sprite region {0} is empty")]
    Empty(Rect),
    #[error("sprite region {rect} lies outside the {image} source image")]
    OutOfBounds { rect: Rect, image: Size },
    #[error("chunk size {0} is empty")]
    EmptyChunk(Size),
}

/// A copy of one chunk's pixels, remembering where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelChunk {
    /// Chunk rectangle in source image coordinates
    pub rect: Rect,
    pixels: Vec<Color>,
}

impl PixelChunk {
    /// Copy the chunk's pixels out of the source image.
    pub fn read(image: &RgbaImage, rect: Rect) -> Self {
        Self { rect, pixels: raster::get_pixels(image, rect) }
    }

    pub fn from_pixels(rect: Rect, pixels: Vec<Color>) -> Self {
        debug_assert_eq!(pixels.len(), rect.size().area());
        Self { rect, pixels }
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Color] {
        &mut self.pixels
    }

    /// Source coordinate of the pixel at row-major `index`.
    pub fn coordinate(&self, index: usize) -> Point {
        let width = self.rect.width.max(1) as usize;
        Point::new(self.rect.x + (index % width) as u32, self.rect.y + (index / width) as u32)
    }

    pub fn into_pixels(self) -> Vec<Color> {
        self.pixels
    }
}
