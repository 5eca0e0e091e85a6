//! Paletted sprite database
//!
//! Owns one [`SpriteSizeBucket`] per sprite size, bakes resolved sprites into
//! their pages, and persists everything to a single checksummed cache file.
//!
//! # Lifecycle
//!
//! ```text
//! Empty --add/repalette--> Building --save--> Saved
//! Empty --load--> Preloaded (add/repalette replay recorded slots)
//! ```
//!
//! A preloaded database never re-bakes: each request receives the slot it
//! had when the cache was built, so requests must be replayed in the same
//! order. A stale cache leaves the database empty and the caller rebuilds.

use crate::bucket::{AtlasPage, SpriteSizeBucket};
use crate::cache_file::{self, CacheError};
use crate::checksum::content_checksum;
use crate::color::Color;
use crate::fs::{FileSystem, OsFileSystem};
use crate::raster::{image_size, Rect, Size};
use crate::remap::{build_substitutions, remap_chunk, Substitutions};
use crate::request::{PixelChunk, SpritePaletteRequest};
use crate::resolve::{resolve_chunk, BakeError, Resolution};
use image::RgbaImage;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;

/// Default maximum page width and height.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 512;

/// Location of a baked sprite: the bucket it lives in, the page within that
/// bucket, and its cell on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BakedSpriteHandle {
    pub bucket: Size,
    pub page: usize,
    pub rect: Rect,
}

/// Where the database is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    Empty,
    Building,
    Saved,
    Preloaded,
}

/// Paths and limits the database works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub cache_file: PathBuf,
    /// Directory holding the checksum roots
    pub content_dir: PathBuf,
    pub checksum_roots: Vec<String>,
    pub max_page_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from("palettes.cache"),
            content_dir: PathBuf::from("content"),
            checksum_roots: vec!["Images".to_string(), "Sprites".to_string()],
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

/// Sprite atlas database with a persistent cache.
#[derive(Debug)]
pub struct PalettedSpriteDatabase<F: FileSystem = OsFileSystem> {
    fs: F,
    settings: DatabaseSettings,
    buckets: BTreeMap<Size, SpriteSizeBucket>,
    state: DatabaseState,
}

impl PalettedSpriteDatabase<OsFileSystem> {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self::with_file_system(OsFileSystem, settings)
    }
}

impl<F: FileSystem> PalettedSpriteDatabase<F> {
    pub fn with_file_system(fs: F, settings: DatabaseSettings) -> Self {
        Self { fs, settings, buckets: BTreeMap::new(), state: DatabaseState::Empty }
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    pub fn state(&self) -> DatabaseState {
        self.state
    }

    pub fn is_preloaded(&self) -> bool {
        self.state == DatabaseState::Preloaded
    }

    pub fn bucket(&self, size: Size) -> Option<&SpriteSizeBucket> {
        self.buckets.get(&size)
    }

    pub fn bucket_sizes(&self) -> impl Iterator<Item = Size> + '_ {
        self.buckets.keys().copied()
    }

    pub fn page(&self, size: Size, index: usize) -> Option<&AtlasPage> {
        self.buckets.get(&size)?.page(index)
    }

    /// Page a handle points into.
    pub fn handle_page(&self, handle: &BakedSpriteHandle) -> Option<&AtlasPage> {
        self.page(handle.bucket, handle.page)
    }

    /// Copy a baked sprite out of its page.
    pub fn handle_image(&self, handle: &BakedSpriteHandle) -> Option<RgbaImage> {
        let page = self.handle_page(handle)?;
        if !handle.rect.fits_within(page.size()) {
            return None;
        }
        let pixels = page.read(handle.rect);
        let raw = pixels.iter().flat_map(|p| p.0).collect();
        RgbaImage::from_raw(handle.rect.width, handle.rect.height, raw)
    }

    /// Bake a sprite into the atlas and return where it landed.
    ///
    /// Every chunk is resolved and remapped before a slot is reserved, so a
    /// failed bake leaves the database unchanged. In a preloaded database the
    /// next recorded slot is returned without touching any pixels.
    pub fn add_sprite(
        &mut self,
        request: &SpritePaletteRequest<'_>,
    ) -> Result<BakedSpriteHandle, BakeError> {
        request.validate()?;
        let size = request.size();

        if self.is_preloaded() {
            let bucket = self.buckets.get_mut(&size).ok_or(BakeError::PreloadOverrun {
                size,
                slot: 0,
                preloaded: 0,
            })?;
            let (page, rect) = bucket.replay_slot().inspect_err(|e| log::error!("{}", e))?;
            return Ok(BakedSpriteHandle { bucket: size, page, rect });
        }

        let pixels = bake_pixels(request)?;

        let max_page_size = self.settings.max_page_size;
        let bucket = self.buckets.entry(size).or_insert_with(|| {
            log::debug!("creating bucket for {} sprites", size);
            SpriteSizeBucket::new(size, max_page_size)
        });
        let (page, rect) = bucket.reserve_slot();
        if let Some(atlas_page) = bucket.page_mut(page) {
            atlas_page.write(rect, &pixels);
        }

        self.state = DatabaseState::Building;
        Ok(BakedSpriteHandle { bucket: size, page, rect })
    }

    /// Re-bake an existing sprite in place from its original source pixels.
    ///
    /// The request normally carries a [`DefaultMapping`](crate::palette::DefaultMapping)
    /// so whole subtypes can be recolored. No new slot is reserved and no
    /// other sprite's pixels change.
    pub fn repalette_sprite(
        &mut self,
        handle: &BakedSpriteHandle,
        request: &SpritePaletteRequest<'_>,
    ) -> Result<BakedSpriteHandle, BakeError> {
        request.validate()?;
        if request.size() != handle.rect.size() {
            return Err(BakeError::SizeMismatch {
                expected: handle.rect.size(),
                found: request.size(),
            });
        }

        let unknown = BakeError::UnknownHandle {
            size: handle.bucket,
            page: handle.page,
            rect: handle.rect,
        };
        let known = self
            .buckets
            .get(&handle.bucket)
            .is_some_and(|bucket| bucket.contains(handle.page, handle.rect));
        if !known {
            return Err(unknown);
        }

        // The cached page already holds the repaletted pixels
        if self.is_preloaded() {
            return Ok(*handle);
        }

        let pixels = bake_pixels(request)?;
        let page = self
            .buckets
            .get_mut(&handle.bucket)
            .and_then(|bucket| bucket.page_mut(handle.page))
            .ok_or(unknown)?;
        page.write(handle.rect, &pixels);

        self.state = DatabaseState::Building;
        Ok(*handle)
    }

    /// Load the cache file.
    ///
    /// Returns false and leaves the database empty when the cache is missing,
    /// from another format version, built from different content, or
    /// unreadable. The caller then rebuilds with [`add_sprite`](Self::add_sprite)
    /// and [`save`](Self::save).
    pub fn load(&mut self) -> bool {
        match self.try_load() {
            Ok(()) => true,
            Err(e) if e.is_stale() => {
                log::info!("sprite cache is stale, rebuilding: {}", e);
                false
            }
            Err(e) => {
                log::warn!(
                    "failed to load sprite cache {}: {}",
                    self.settings.cache_file.display(),
                    e
                );
                false
            }
        }
    }

    /// Load the cache file, reporting why it was rejected.
    pub fn try_load(&mut self) -> Result<(), CacheError> {
        if self.state != DatabaseState::Empty {
            return Err(CacheError::NotEmpty);
        }

        let path = &self.settings.cache_file;
        if !self.fs.exists(path) {
            return Err(CacheError::Missing(path.clone()));
        }
        let bytes = self.fs.read(path)?;
        let checksum = self.checksum()?;
        let (_, cached) = cache_file::decode(&bytes, Some(checksum))?;

        let mut buckets = BTreeMap::new();
        for entry in cached {
            if let Some(first) = entry.pages.first() {
                let page_size = image_size(first);
                let sprite = entry.sprite_size;
                if page_size.width < sprite.width || page_size.height < sprite.height {
                    return Err(CacheError::Invalid(format!(
                        "{} page is smaller than its {} sprites",
                        page_size, sprite
                    )));
                }
                if entry.pages.iter().any(|page| image_size(page) != page_size) {
                    return Err(CacheError::Invalid(format!(
                        "pages of the {} bucket differ in size",
                        sprite
                    )));
                }
            }
            let pages: Vec<AtlasPage> = entry.pages.into_iter().map(AtlasPage::from_image).collect();
            let bucket = SpriteSizeBucket::preloaded(
                entry.sprite_size,
                entry.sprite_count,
                pages,
                self.settings.max_page_size,
            );
            if bucket.sprite_count() > bucket.page_count() * bucket.slots_per_page() {
                return Err(CacheError::Invalid(format!(
                    "{} sprites of size {} do not fit in {} pages",
                    bucket.sprite_count(),
                    entry.sprite_size,
                    bucket.page_count()
                )));
            }
            if buckets.insert(entry.sprite_size, bucket).is_some() {
                return Err(CacheError::Invalid(format!(
                    "duplicate bucket for size {}",
                    entry.sprite_size
                )));
            }
        }

        log::info!(
            "loaded sprite cache {} ({} buckets)",
            self.settings.cache_file.display(),
            buckets.len()
        );
        self.buckets = buckets;
        self.state = DatabaseState::Preloaded;
        Ok(())
    }

    /// Write the cache file.
    ///
    /// The file is assembled in memory and replaced in one step; on failure
    /// false is returned and both the old file and the database are intact.
    pub fn save(&mut self) -> bool {
        match self.try_save() {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "failed to save sprite cache {}: {}",
                    self.settings.cache_file.display(),
                    e
                );
                false
            }
        }
    }

    /// Write the cache file, reporting any failure.
    pub fn try_save(&mut self) -> Result<(), CacheError> {
        let checksum = self.checksum()?;
        let bytes = cache_file::encode(checksum, self.buckets.values())?;
        self.fs.write(&self.settings.cache_file, &bytes)?;

        log::info!(
            "saved sprite cache {} ({} buckets, {} bytes)",
            self.settings.cache_file.display(),
            self.buckets.len(),
            bytes.len()
        );
        if self.state != DatabaseState::Preloaded {
            self.state = DatabaseState::Saved;
        }
        Ok(())
    }

    /// Checksum of the current content tree.
    pub fn checksum(&self) -> io::Result<i32> {
        content_checksum(&self.fs, &self.settings.content_dir, &self.settings.checksum_roots)
    }

    /// Release every page and return to the empty state.
    pub fn dispose(&mut self) {
        self.buckets.clear();
        self.state = DatabaseState::Empty;
    }
}

/// Resolve and remap every chunk of a request into a sprite-sized block.
fn bake_pixels(request: &SpritePaletteRequest<'_>) -> Result<Vec<Color>, BakeError> {
    let size = request.size();
    let mut out = vec![crate::color::TRANSPARENT; size.area()];
    let mut substitutions: HashMap<usize, Substitutions> = HashMap::new();
    let passthrough = Substitutions::new();

    for chunk_rect in request.chunks() {
        let mut chunk = PixelChunk::read(request.image, chunk_rect);
        let table = match resolve_chunk(request, &mut chunk)? {
            Resolution::Group(group) => &*substitutions
                .entry(group)
                .or_insert_with(|| {
                    build_substitutions(request.mappings, request.ignore, group, request.defaults)
                }),
            Resolution::Passthrough => &passthrough,
        };
        remap_chunk(&mut chunk, table);

        let offset_x = (chunk_rect.x - request.rect.x) as usize;
        let offset_y = (chunk_rect.y - request.rect.y) as usize;
        let width = chunk_rect.width as usize;
        for (row, line) in chunk.pixels().chunks(width).enumerate() {
            let start = (offset_y + row) * size.width as usize + offset_x;
            out[start..start + width].copy_from_slice(line);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{ColorGroup, ColorMappingTable, DefaultMapping, IgnoreSet, Subtype};
    use image::Rgba;
    use tempfile::TempDir;

    const RED: Color = Rgba([255, 0, 0, 255]);
    const BLACK: Color = Rgba([0, 0, 0, 255]);
    const PINK: Color = Rgba([255, 128, 192, 255]);
    const BLUE: Color = Rgba([0, 0, 255, 255]);
    const DARK_GRAY: Color = Rgba([64, 64, 64, 255]);
    const GREEN: Color = Rgba([0, 255, 0, 255]);

    fn mappings() -> ColorMappingTable {
        ColorMappingTable::new()
            .with(RED, 0, Subtype::Other, PINK)
            .with(RED, 1, Subtype::Other, BLUE)
            .with(BLACK, 0, Subtype::Black, BLACK)
            .with(BLACK, 1, Subtype::Black, DARK_GRAY)
            .with(GREEN, 2, Subtype::Other, GREEN)
    }

    fn database(temp: &TempDir, max_page_size: u32) -> PalettedSpriteDatabase {
        PalettedSpriteDatabase::new(DatabaseSettings {
            cache_file: temp.path().join("cache.bin"),
            content_dir: temp.path().join("content"),
            max_page_size,
            ..Default::default()
        })
    }

    #[test]
    fn test_add_sprite_example_scenario() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 64);
        let mut image = RgbaImage::from_pixel(16, 16, RED);
        image.put_pixel(5, 9, BLACK);

        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 16, 16), &table, &ignore)
            .with_chunk_size(Size::new(16, 16));
        let handle = db.add_sprite(&request).unwrap();

        assert_eq!(handle.bucket, Size::new(16, 16));
        assert_eq!(handle.page, 0);
        assert_eq!(handle.rect, Rect::new(0, 0, 16, 16));

        let baked = db.handle_image(&handle).unwrap();
        assert_eq!(*baked.get_pixel(0, 0), PINK);
        assert_eq!(*baked.get_pixel(5, 9), BLACK);
        assert_eq!(db.state(), DatabaseState::Building);
    }

    #[test]
    fn test_chunks_resolve_independently() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 64);
        // Left half red (groups 0 and 1), right half green (group 2 only)
        let mut image = RgbaImage::from_pixel(16, 8, RED);
        for y in 0..8 {
            for x in 8..16 {
                image.put_pixel(x, y, GREEN);
            }
        }

        let table = mappings();
        let ignore = IgnoreSet::new();
        let whole = SpritePaletteRequest::new(&image, Rect::new(0, 0, 16, 8), &table, &ignore);
        assert!(matches!(db.add_sprite(&whole), Err(BakeError::NoMatchingColorGroups { .. })));

        let chunked = whole.clone().with_chunk_size(Size::new(8, 8));
        let handle = db.add_sprite(&chunked).unwrap();
        let baked = db.handle_image(&handle).unwrap();
        assert_eq!(*baked.get_pixel(0, 0), PINK);
        assert_eq!(*baked.get_pixel(15, 7), GREEN);
    }

    #[test]
    fn test_failed_bake_consumes_no_slot() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 64);
        let image = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]));
        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 8, 8), &table, &ignore);

        assert!(db.add_sprite(&request).is_err());
        assert!(db.bucket(Size::new(8, 8)).is_none());
        assert_eq!(db.state(), DatabaseState::Empty);
    }

    #[test]
    fn test_transparent_sprite_is_zeroed() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 64);
        let image = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 0]));
        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 4, 4), &table, &ignore);

        let handle = db.add_sprite(&request).unwrap();
        let baked = db.handle_image(&handle).unwrap();
        assert!(baked.pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_repalette_in_place() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 32);
        let image = RgbaImage::from_pixel(16, 16, BLACK);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 16, 16), &table, &ignore);

        let first = db.add_sprite(&request).unwrap();
        let second = db.add_sprite(&request).unwrap();
        let before_second = db.handle_image(&second).unwrap();
        let next_slot = db.bucket(Size::new(16, 16)).unwrap().next_slot();

        let defaults = DefaultMapping::new().with(Subtype::Black, BLUE);
        let repalette = request.clone().with_defaults(&defaults);
        let handle = db.repalette_sprite(&first, &repalette).unwrap();

        assert_eq!(handle, first);
        assert_eq!(*db.handle_image(&first).unwrap().get_pixel(3, 3), BLUE);
        assert_eq!(db.handle_image(&second).unwrap(), before_second);
        assert_eq!(db.bucket(Size::new(16, 16)).unwrap().next_slot(), next_slot);
    }

    #[test]
    fn test_repalette_rejects_unknown_handle_and_size() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 32);
        let image = RgbaImage::from_pixel(16, 16, BLACK);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 16, 16), &table, &ignore);
        let handle = db.add_sprite(&request).unwrap();

        let stranger = BakedSpriteHandle { page: 3, ..handle };
        assert!(matches!(
            db.repalette_sprite(&stranger, &request),
            Err(BakeError::UnknownHandle { .. })
        ));

        let small = SpritePaletteRequest::new(&image, Rect::new(0, 0, 8, 8), &table, &ignore);
        assert!(matches!(
            db.repalette_sprite(&handle, &small),
            Err(BakeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_load_missing_cache_returns_false() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 32);
        assert!(!db.load());
        assert_eq!(db.state(), DatabaseState::Empty);
    }

    #[test]
    fn test_load_requires_empty_database() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 32);
        let image = RgbaImage::from_pixel(4, 4, BLACK);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 4, 4), &table, &ignore);
        db.add_sprite(&request).unwrap();
        assert!(db.save());

        assert!(matches!(db.try_load(), Err(CacheError::NotEmpty)));
    }

    #[test]
    fn test_preloaded_replays_slots() {
        let temp = TempDir::new().unwrap();
        let image = RgbaImage::from_pixel(8, 8, RED);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 8, 8), &table, &ignore);

        let mut built = database(&temp, 16);
        let handles: Vec<_> = (0..5).map(|_| built.add_sprite(&request).unwrap()).collect();
        assert!(built.save());
        assert_eq!(built.state(), DatabaseState::Saved);

        let mut loaded = database(&temp, 16);
        assert!(loaded.load());
        assert!(loaded.is_preloaded());
        for handle in &handles {
            assert_eq!(loaded.add_sprite(&request).unwrap(), *handle);
        }
        let err = loaded.add_sprite(&request).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_preloaded_unknown_size_is_overrun() {
        let temp = TempDir::new().unwrap();
        let mut built = database(&temp, 16);
        assert!(built.save());

        let mut loaded = database(&temp, 16);
        assert!(loaded.load());
        let image = RgbaImage::from_pixel(8, 8, RED);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 8, 8), &table, &ignore);
        assert!(matches!(loaded.add_sprite(&request), Err(BakeError::PreloadOverrun { .. })));
    }

    #[test]
    fn test_dispose_releases_pages() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 16);
        let image = RgbaImage::from_pixel(8, 8, RED);
        let table = mappings();
        let ignore = IgnoreSet::new();
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 8, 8), &table, &ignore);
        let handle = db.add_sprite(&request).unwrap();

        db.dispose();
        assert!(db.handle_page(&handle).is_none());
        assert_eq!(db.state(), DatabaseState::Empty);
    }

    #[test]
    fn test_ignored_mapped_color_passes_through() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 64);
        let mut image = RgbaImage::from_pixel(4, 2, RED);
        image.put_pixel(3, 1, BLACK);

        let table = mappings();
        let ignore = IgnoreSet::from([RED]);
        let request = SpritePaletteRequest::new(&image, Rect::new(0, 0, 4, 2), &table, &ignore)
            .with_groups(&[ColorGroup::new("dark", 1)]);
        let handle = db.add_sprite(&request).unwrap();

        let baked = db.handle_image(&handle).unwrap();
        assert_eq!(*baked.get_pixel(0, 0), RED);
        assert_eq!(*baked.get_pixel(3, 1), DARK_GRAY);
    }

    fn write_cache(db: &PalettedSpriteDatabase, sprite: Size, pages: Vec<Size>) {
        let pages = pages.into_iter().map(AtlasPage::new).collect();
        let bucket = SpriteSizeBucket::preloaded(sprite, 1, pages, 64);
        let bytes = cache_file::encode(db.checksum().unwrap(), [&bucket]).unwrap();
        std::fs::write(&db.settings().cache_file, bytes).unwrap();
    }

    #[test]
    fn test_load_rejects_page_smaller_than_sprite() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 64);
        write_cache(&db, Size::new(16, 16), vec![Size::new(8, 8)]);

        assert!(matches!(db.try_load(), Err(CacheError::Invalid(_))));
        assert_eq!(db.state(), DatabaseState::Empty);
    }

    #[test]
    fn test_load_rejects_mixed_page_sizes() {
        let temp = TempDir::new().unwrap();
        let mut db = database(&temp, 64);
        write_cache(&db, Size::new(8, 8), vec![Size::new(16, 16), Size::new(32, 32)]);

        assert!(matches!(db.try_load(), Err(CacheError::Invalid(_))));
        assert!(!db.load());
    }
}
