//! Fixed-cell atlas pages and the per-size buckets that allocate from them
//!
//! Every sprite in a bucket has the same pixel size, so a page is a plain
//! grid of equal cells and a slot index maps directly to a page and cell:
//!
//! ```text
//! page_index = slot / slots_per_page
//! cell_index = slot % slots_per_page
//! cell       = (cell_index % columns, cell_index / columns) * sprite_size
//! ```
//!
//! Slots are handed out in increasing order and never reused.

use crate::color::Color;
use crate::raster::{self, image_size, Rect, Size};
use crate::resolve::BakeError;
use image::RgbaImage;

/// A page of atlas pixels divided into equal cells.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasPage {
    image: RgbaImage,
}

impl AtlasPage {
    /// Allocate a transparent page.
    pub fn new(size: Size) -> Self {
        Self { image: RgbaImage::new(size.width, size.height) }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn size(&self) -> Size {
        image_size(&self.image)
    }

    pub fn read(&self, rect: Rect) -> Vec<Color> {
        raster::get_pixels(&self.image, rect)
    }

    pub fn write(&mut self, rect: Rect, pixels: &[Color]) {
        raster::set_pixels(&mut self.image, rect, pixels);
    }
}

/// Atlas state for one sprite size.
#[derive(Debug, Clone)]
pub struct SpriteSizeBucket {
    sprite_size: Size,
    /// Cells per page as (columns, rows)
    capacity: (u32, u32),
    pages: Vec<AtlasPage>,
    next_slot: usize,
    /// Sprite count recorded in the cache this bucket was loaded from
    preloaded: Option<usize>,
}

impl SpriteSizeBucket {
    /// Create an empty bucket whose pages are at most `max_page_size` wide
    /// and tall, or one sprite in size when the sprite is larger than that.
    pub fn new(sprite_size: Size, max_page_size: u32) -> Self {
        Self {
            sprite_size,
            capacity: page_capacity(sprite_size, Size::new(max_page_size, max_page_size)),
            pages: Vec::new(),
            next_slot: 0,
            preloaded: None,
        }
    }

    /// Rebuild a bucket from cached pages.
    ///
    /// The grid is derived from the stored page dimensions so a later change
    /// to the configured page size cannot shift recorded slots.
    pub fn preloaded(
        sprite_size: Size,
        sprite_count: usize,
        pages: Vec<AtlasPage>,
        max_page_size: u32,
    ) -> Self {
        let capacity = match pages.first() {
            Some(page) => page_capacity(sprite_size, page.size()),
            None => page_capacity(sprite_size, Size::new(max_page_size, max_page_size)),
        };
        Self { sprite_size, capacity, pages, next_slot: 0, preloaded: Some(sprite_count) }
    }

    pub fn sprite_size(&self) -> Size {
        self.sprite_size
    }

    pub fn slots_per_page(&self) -> usize {
        self.capacity.0 as usize * self.capacity.1 as usize
    }

    /// Pixel size of every page in this bucket.
    pub fn page_size(&self) -> Size {
        Size::new(
            self.capacity.0 * self.sprite_size.width,
            self.capacity.1 * self.sprite_size.height,
        )
    }

    pub fn pages(&self) -> &[AtlasPage] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&AtlasPage> {
        self.pages.get(index)
    }

    pub fn page_mut(&mut self, index: usize) -> Option<&mut AtlasPage> {
        self.pages.get_mut(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Next slot index a bake will receive.
    pub fn next_slot(&self) -> usize {
        self.next_slot
    }

    pub fn is_preloaded(&self) -> bool {
        self.preloaded.is_some()
    }

    /// Number of sprites this bucket holds: the recorded count when
    /// preloaded, otherwise the number baked so far.
    pub fn sprite_count(&self) -> usize {
        self.preloaded.unwrap_or(self.next_slot)
    }

    /// Page index and cell rectangle of a slot.
    pub fn slot_location(&self, slot: usize) -> (usize, Rect) {
        let per_page = self.slots_per_page();
        let page = slot / per_page;
        let cell = slot % per_page;
        let columns = self.capacity.0 as usize;
        let rect = Rect::new(
            (cell % columns) as u32 * self.sprite_size.width,
            (cell / columns) as u32 * self.sprite_size.height,
            self.sprite_size.width,
            self.sprite_size.height,
        );
        (page, rect)
    }

    /// Reserve the next slot, allocating a page when the current one is full.
    pub fn reserve_slot(&mut self) -> (usize, Rect) {
        let (page, rect) = self.slot_location(self.next_slot);
        if page == self.pages.len() {
            log::debug!(
                "allocating {} page {} for {} sprites",
                self.page_size(),
                page,
                self.sprite_size
            );
            self.pages.push(AtlasPage::new(self.page_size()));
        }
        self.next_slot += 1;
        (page, rect)
    }

    /// Replay the next recorded slot of a preloaded bucket.
    ///
    /// Fails when more slots are requested than the cache recorded.
    pub fn replay_slot(&mut self) -> Result<(usize, Rect), BakeError> {
        let preloaded = self.preloaded.unwrap_or(0);
        let (page, rect) = self.slot_location(self.next_slot);
        if self.next_slot >= preloaded || page >= self.pages.len() {
            return Err(BakeError::PreloadOverrun {
                size: self.sprite_size,
                slot: self.next_slot,
                preloaded,
            });
        }
        self.next_slot += 1;
        Ok((page, rect))
    }

    /// True if `rect` on `page` is a slot this bucket has handed out.
    pub fn contains(&self, page: usize, rect: Rect) -> bool {
        if page >= self.pages.len()
            || rect.size() != self.sprite_size
            || rect.x % self.sprite_size.width != 0
            || rect.y % self.sprite_size.height != 0
        {
            return false;
        }
        let column = (rect.x / self.sprite_size.width) as usize;
        let row = (rect.y / self.sprite_size.height) as usize;
        if column >= self.capacity.0 as usize || row >= self.capacity.1 as usize {
            return false;
        }
        let slot = page * self.slots_per_page() + row * self.capacity.0 as usize + column;
        slot < self.sprite_count().max(self.next_slot)
    }
}

/// Cells per page as (columns, rows), never less than one in each axis.
fn page_capacity(sprite_size: Size, page_size: Size) -> (u32, u32) {
    (
        (page_size.width / sprite_size.width.max(1)).max(1),
        (page_size.height / sprite_size.height.max(1)).max(1),
    )
}
